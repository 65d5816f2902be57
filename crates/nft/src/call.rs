//! Call and query messages for the NFT registry.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sealed_types::Address;

#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum NftCall {
    /// Mint the next token id to `to` (registry owner only).
    Mint { to: Address },

    /// Let `spender` move `token_id` once (token owner only).
    Approve { spender: Address, token_id: u64 },

    /// Move `token_id` from `from` to `to` (owner or approved).
    TransferFrom {
        from: Address,
        to: Address,
        token_id: u64,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NftQuery {
    OwnerOf { token_id: u64 },
    Approved { token_id: u64 },
    TokensOf { owner: Address },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NftQueryResponse {
    Owner(Option<Address>),
    Approved(Option<Address>),
    Tokens(Vec<u64>),
}
