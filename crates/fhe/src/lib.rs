//! Ciphertext arithmetic layer.
//!
//! Everything above this crate manipulates [`EncryptedValue`] handles only:
//!
//! - `executor`: the ciphertext store and the homomorphic operations
//!   (`add`, `sub`, `lt`, `le`, `eq`, `and`, `not`, `select`), executed on
//!   behalf of a contract domain
//! - `acl`: access tags; which domains may compute on a value and which
//!   principals may ask for its plaintext
//! - `input`: verification of client inputs and their well-formedness proofs
//! - `gateway`: two-phase decryption (request ticket now, plaintext on a
//!   later call), with an audit trail and request expiry
//!
//! Business logic must express every condition on encrypted data with
//! `select`; there is no API that hands plaintext back inside a transaction.
//!
//! [`EncryptedValue`]: sealed_types::EncryptedValue

pub mod acl;
mod backend;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod input;

pub use acl::AccessTag;
pub use error::FheError;
pub use executor::{FheContext, FheExecutor};
pub use gateway::{
    AuditEntry, AuditEvent, DecryptionCallback, DecryptionRequest, DecryptionResult, Gateway,
    GatewayCheckpoint, RequestId, RequestState,
};
