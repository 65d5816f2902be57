//! Input creation and encryption.

use rand::{CryptoRng, RngCore};
use thiserror::Error;

use sealed_crypto::{encode_payload, pedersen_commit, InputParams, PedersenParams};
use sealed_types::{
    compute_input_identity, Address, ExternalInput, FheType, InputProof, NetworkPublicKey, Scalar,
};

/// Errors that can occur during input creation.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Invalid network public key")]
    InvalidNetworkKey,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Value {value} does not fit in {ty:?}")]
    ValueOutOfRange { value: u64, ty: FheType },
}

/// An input ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// Envelope and proof, as passed to a contract call
    pub input: ExternalInput,
    /// Original value (keep secret)
    pub value: u64,
    /// Commitment randomness (keep secret)
    pub randomness: Scalar,
}

/// Encrypt `value` for a call by `sender` to the contract at `domain`.
///
/// The envelope only opens for that contract and that sender, so an input
/// cannot be replayed by someone else or against another contract.
pub fn encrypt_input<R: RngCore + CryptoRng>(
    network_key: &NetworkPublicKey,
    domain: &Address,
    sender: &Address,
    value: u64,
    ty: FheType,
    rng: &mut R,
) -> Result<PreparedInput, InputError> {
    if value > ty.max_value() {
        return Err(InputError::ValueOutOfRange { value, ty });
    }

    let (commitment, randomness) = pedersen_commit(&PedersenParams::new(), value, rng);

    let params = InputParams::from_public_key(network_key).map_err(|_| InputError::InvalidNetworkKey)?;
    let identity = compute_input_identity(domain, sender, ty);

    let envelope = sealed_crypto::encrypt_input(
        &params,
        &identity,
        &encode_payload(value, &randomness),
        ty,
        rng,
    )
    .map_err(|e| InputError::EncryptionFailed(e.to_string()))?;

    Ok(PreparedInput {
        input: ExternalInput {
            envelope,
            proof: InputProof { commitment },
        },
        value,
        randomness,
    })
}

/// Builder for inputs to one contract.
pub struct InputBuilder {
    network_key: NetworkPublicKey,
    domain: Address,
    sender: Address,
    ty: FheType,
}

impl InputBuilder {
    /// Inputs from `sender` to the contract at `domain`, as `u64` by default.
    pub fn new(network_key: NetworkPublicKey, domain: Address, sender: Address) -> Self {
        Self {
            network_key,
            domain,
            sender,
            ty: FheType::U64,
        }
    }

    /// Set the declared plaintext type.
    pub fn ty(mut self, ty: FheType) -> Self {
        self.ty = ty;
        self
    }

    /// Encrypt one value.
    pub fn encrypt<R: RngCore + CryptoRng>(&self, value: u64, rng: &mut R) -> Result<PreparedInput, InputError> {
        encrypt_input(&self.network_key, &self.domain, &self.sender, value, self.ty, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use sealed_crypto::{decode_payload, open_input, pedersen_verify, NetworkKeys};

    const CONTRACT: Address = [1u8; 32];
    const ALICE: Address = [2u8; 32];

    fn keys() -> NetworkKeys {
        NetworkKeys::from_seed(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_input() {
        let keys = keys();
        let prepared =
            encrypt_input(&keys.public_key(), &CONTRACT, &ALICE, 1000, FheType::U64, &mut OsRng).unwrap();
        assert_eq!(prepared.value, 1000);

        let identity = compute_input_identity(&CONTRACT, &ALICE, FheType::U64);
        let payload = open_input(&keys, &identity, &prepared.input.envelope).unwrap();
        let (value, randomness) = decode_payload(&payload).unwrap();
        assert_eq!(value, 1000);
        assert_eq!(randomness, prepared.randomness);
        assert!(pedersen_verify(&PedersenParams::new(), &prepared.input.proof.commitment, value, &randomness).is_ok());
    }

    #[test]
    fn test_value_must_fit_type() {
        let keys = keys();
        let result = encrypt_input(&keys.public_key(), &CONTRACT, &ALICE, 256, FheType::U8, &mut OsRng);
        assert!(matches!(result, Err(InputError::ValueOutOfRange { value: 256, .. })));
    }

    #[test]
    fn test_input_builder() {
        let keys = keys();
        let prepared = InputBuilder::new(keys.public_key(), CONTRACT, ALICE)
            .ty(FheType::U32)
            .encrypt(500, &mut OsRng)
            .unwrap();

        assert_eq!(prepared.value, 500);
        assert_eq!(prepared.input.envelope.ty, FheType::U32);
    }

    #[test]
    fn test_bad_network_key() {
        let bogus = NetworkPublicKey {
            mpk: sealed_types::G2Point([0xffu8; 96]),
        };
        let result = encrypt_input(&bogus, &CONTRACT, &ALICE, 1, FheType::U64, &mut OsRng);
        assert!(matches!(result, Err(InputError::InvalidNetworkKey)));
    }
}
