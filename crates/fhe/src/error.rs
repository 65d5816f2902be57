//! Errors raised by the ciphertext arithmetic layer.
//!
//! All of these are public, hard failures: they depend only on handles,
//! types and permissions, never on encrypted values.

use thiserror::Error;

use sealed_crypto::CryptoError;
use sealed_types::{Address, FheType, Handle};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FheError {
    #[error("Domain mismatch: {} is not admitted on ciphertext {handle}", hex::encode(.domain))]
    DomainMismatch { handle: Handle, domain: Address },

    #[error("Type mismatch. Expected: {expected:?}, Got: {got:?}")]
    TypeMismatch { expected: FheType, got: FheType },

    #[error("Unknown ciphertext handle {0}")]
    UnknownHandle(Handle),

    #[error("Malformed input proof: {0}")]
    MalformedProof(String),

    #[error("Principal {} may not decrypt ciphertext {handle}", hex::encode(.principal))]
    Unauthorized { principal: Address, handle: Handle },

    #[error("Constant {value} does not fit in {ty:?}")]
    ValueOutOfRange { value: u64, ty: FheType },

    #[error("Decryption request not found: {0}")]
    UnknownRequest(String),

    #[error("Decryption request is no longer pending")]
    RequestNotPending,

    #[error("Decryption request expired")]
    RequestExpired,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
