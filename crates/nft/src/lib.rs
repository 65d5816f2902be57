//! NFT ownership registry.
//!
//! Plaintext ownership with single-token approvals, enough for the auction
//! to hold a token in escrow and hand it to the winner.

pub mod call;
pub mod error;
pub mod registry;

pub use call::{NftCall, NftQuery, NftQueryResponse};
pub use error::NftError;
pub use registry::{handle_call, handle_query, NftEvent, NftRegistry};
