//! Auction engine error types.
//!
//! A bid that fails to pull funds or falls below the reserve is not an
//! error; it is escrowed as an encrypted zero and can never win.

use thiserror::Error;

use sealed_fhe::FheError;
use sealed_nft::NftError;
use sealed_token::TokenError;
use sealed_types::{Address, AuctionPhase};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("Auction not found: {0}")]
    AuctionNotFound(u64),

    #[error("Cannot {action} while auction is {phase:?}")]
    InvalidStateTransition {
        phase: AuctionPhase,
        action: &'static str,
    },

    #[error("Invalid timing configuration")]
    InvalidTiming,

    #[error("Not authorized: {}", sealed_types::short_address(.0))]
    Unauthorized(Address),

    #[error("Seller may not bid on their own auction")]
    SellerCannotBid,

    #[error("Auction is full: at most {0} bidders")]
    AuctionFull(u32),

    #[error("Decryption result does not belong to the pending settlement")]
    CorrelationMismatch,

    #[error("Token ledger: {0}")]
    Token(#[from] TokenError),

    #[error("NFT registry: {0}")]
    Nft(#[from] NftError),

    #[error(transparent)]
    Fhe(#[from] FheError),
}
