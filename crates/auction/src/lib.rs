//! Sealed-bid second-price NFT auction.
//!
//! Sellers escrow an NFT; bidders escrow encrypted token amounts through the
//! confidential ledger. Settlement computes the highest bidder and the
//! clearing price under encryption, and only the winner's position in the
//! bid order is ever decrypted:
//!
//! - `call`: message types for state-changing operations
//! - `handlers`: business logic for processing calls and the gateway
//!   callback
//! - `settlement`: the encrypted second-price reduction
//! - `queries`: read-only state access
//! - `state`: auction state and limits
//! - `error`: error types

pub mod call;
pub mod error;
pub mod handlers;
pub mod queries;
pub mod settlement;
pub mod state;

pub use call::AuctionCall;
pub use error::AuctionError;
pub use handlers::{handle_call, handle_winner_revealed, AuctionEnv, AuctionOutput, HandlerResult};
pub use queries::{handle_query, AuctionQuery, AuctionQueryResponse};
pub use state::{AuctionEvent, AuctionParams, AuctionState};
