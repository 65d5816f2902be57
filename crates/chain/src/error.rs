//! Runtime error types.

use thiserror::Error;

use sealed_auction::AuctionError;
use sealed_fhe::FheError;
use sealed_nft::NftError;
use sealed_token::TokenError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Invalid genesis config: {0}")]
    InvalidGenesis(String),

    #[error("Contract address {0} cannot send transactions")]
    ReservedSender(String),

    #[error("No contract accepts callbacks at {0}")]
    UnknownCallback(String),

    #[error("Decryption result carried no plaintext")]
    EmptyDecryption,

    #[error("Token: {0}")]
    Token(#[from] TokenError),

    #[error("NFT: {0}")]
    Nft(#[from] NftError),

    #[error("Auction: {0}")]
    Auction(#[from] AuctionError),

    #[error("FHE: {0}")]
    Fhe(#[from] FheError),
}
