//! Query handlers for the token ledger.
//!
//! Balances and allowances come back as ciphertext handles; reading them
//! requires being a viewer.

use serde::{Deserialize, Serialize};

use sealed_types::{Address, EncryptedValue};

use crate::state::TokenState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TokenQuery {
    Metadata,
    TotalSupply,
    BalanceOf { account: Address },
    Allowance { owner: Address, spender: Address },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenQueryResponse {
    Metadata {
        name: String,
        symbol: String,
        decimals: u8,
        owner: Address,
    },
    TotalSupply(u64),
    /// `None` for accounts that never held a balance
    Balance(Option<EncryptedValue>),
    Allowance(Option<EncryptedValue>),
}

/// Handle a query.
pub fn handle_query(state: &TokenState, query: TokenQuery) -> TokenQueryResponse {
    match query {
        TokenQuery::Metadata => TokenQueryResponse::Metadata {
            name: state.name.clone(),
            symbol: state.symbol.clone(),
            decimals: state.decimals,
            owner: state.owner,
        },
        TokenQuery::TotalSupply => TokenQueryResponse::TotalSupply(state.total_supply),
        TokenQuery::BalanceOf { account } => TokenQueryResponse::Balance(state.balance(&account)),
        TokenQuery::Allowance { owner, spender } => {
            TokenQueryResponse::Allowance(state.allowance(&owner, &spender))
        }
    }
}
