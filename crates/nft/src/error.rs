use thiserror::Error;

use sealed_types::Address;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NftError {
    #[error("Token not found: {0}")]
    TokenNotFound(u64),

    #[error("Unauthorized: {} may not move or approve token {token_id}", sealed_types::short_address(.caller))]
    Unauthorized { caller: Address, token_id: u64 },

    #[error("Token {token_id} is not owned by {}", sealed_types::short_address(.from))]
    NotOwner { from: Address, token_id: u64 },

    #[error("Only the registry owner may mint")]
    NotMinter,
}
