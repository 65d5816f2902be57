//! Devnet runtime for the confidential token and the sealed-bid auction.
//!
//! - `genesis`: initial contracts, holdings and limits
//! - `runtime`: sequential call execution with rollback and callback routing
//! - `service`: async command loop around the runtime, with the relayer
//! - `error`: error types

pub mod error;
pub mod genesis;
pub mod runtime;
pub mod service;

pub use error::ChainError;
pub use genesis::{parse_address, GenesisConfig, MintConfig};
pub use runtime::{
    auction_address, nft_address, relayer_address, token_address, CallOutput, Chain, ChainState,
    Receipt, RuntimeCall, RuntimeEvent,
};
pub use service::{ChainQuery, ChainQueryResponse, ChainService, ServiceConfig, ServiceStats};
