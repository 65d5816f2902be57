//! Token ledger error types.
//!
//! Insufficient balance or allowance is not an error: it yields an
//! encrypted `false` flag.

use thiserror::Error;

use sealed_fhe::FheError;
use sealed_types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Unauthorized: {} may not perform this call", sealed_types::short_address(.0))]
    Unauthorized(Address),

    #[error("Caller {} may not use the supplied ciphertext", sealed_types::short_address(.0))]
    CiphertextNotAllowed(Address),

    #[error("Total supply overflow")]
    SupplyOverflow,

    #[error(transparent)]
    Fhe(#[from] FheError),
}

