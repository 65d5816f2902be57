//! At-rest sealing of executor ciphertexts.
//!
//! Layout of a sealed box: `nonce (12) || ciphertext || tag (16)`.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{CryptoRng, RngCore};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// AES-256-GCM key for ciphertexts in the executor's store.
#[derive(Clone)]
pub struct SealingKey([u8; 32]);

impl SealingKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Seal `plaintext` with a fresh random nonce, authenticating `aad`.
    pub fn seal<R: RngCore + CryptoRng>(
        &self,
        plaintext: &[u8],
        aad: &[u8],
        rng: &mut R,
    ) -> Result<Vec<u8>, CryptoError> {
        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Open a sealed box produced by [`SealingKey::seal`].
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::InvalidCiphertextFormat);
        }

        let cipher = Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_fresh_nonce_per_seal() {
        let key = SealingKey::new([5u8; 32]);
        let a = key.seal(&42u64.to_le_bytes(), b"u64", &mut OsRng).unwrap();
        let b = key.seal(&42u64.to_le_bytes(), b"u64", &mut OsRng).unwrap();

        assert_ne!(a, b);
        assert_eq!(key.open(&a, b"u64").unwrap(), 42u64.to_le_bytes());
    }

    #[test]
    fn test_aad_is_bound() {
        let key = SealingKey::new([5u8; 32]);
        let sealed = key.seal(b"1", b"bool", &mut OsRng).unwrap();

        assert_eq!(
            key.open(&sealed, b"u64"),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn test_truncated_box_rejected() {
        let key = SealingKey::new([5u8; 32]);
        assert_eq!(
            key.open(&[0u8; 10], b""),
            Err(CryptoError::InvalidCiphertextFormat)
        );
    }
}
