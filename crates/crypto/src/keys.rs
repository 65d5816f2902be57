//! Network key material.
//!
//! Everything is derived from one 32-byte seed so that a devnet can be
//! restarted with identical keys from its genesis file.

use std::fmt;

use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use group::Curve;
use hkdf::Hkdf;
use sha2::Sha256;

use sealed_types::NetworkPublicKey;

use crate::envelope::{compress_g2, hash_to_g1};
use crate::error::CryptoError;
use crate::sealing::SealingKey;

/// Secret keys held by the executor.
#[derive(Clone)]
pub struct NetworkKeys {
    input_secret: Scalar,
    input_public: G2Affine,
    sealing: SealingKey,
}

impl NetworkKeys {
    /// Expand a seed into the input secret and the at-rest sealing key.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(Some(b"SEALED_NETWORK_KEYS_V1"), seed);

        let mut wide = [0u8; 64];
        hk.expand(b"input-secret", &mut wide)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;
        let input_secret = Scalar::from_bytes_wide(&wide);
        let input_public = (G2Projective::generator() * input_secret).to_affine();

        let mut sealing = [0u8; 32];
        hk.expand(b"at-rest-sealing", &mut sealing)
            .map_err(|_| CryptoError::KeyDerivationFailed)?;

        Ok(Self {
            input_secret,
            input_public,
            sealing: SealingKey::new(sealing),
        })
    }

    /// Key clients encrypt their inputs to.
    pub fn public_key(&self) -> NetworkPublicKey {
        NetworkPublicKey {
            mpk: compress_g2(&self.input_public),
        }
    }

    /// Per-identity decryption key σ = s·H(id).
    pub fn identity_key(&self, identity: &[u8]) -> G1Affine {
        (G1Projective::from(hash_to_g1(identity)) * self.input_secret).to_affine()
    }

    pub fn sealing_key(&self) -> &SealingKey {
        &self.sealing
    }
}

impl fmt::Debug for NetworkKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkKeys")
            .field("public", &self.public_key().mpk)
            .finish_non_exhaustive()
    }
}
