//! Registry state and handlers.

use std::collections::{BTreeMap, HashMap};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sealed_types::{short_address, Address, CallContext};

use crate::call::{NftCall, NftQuery, NftQueryResponse};
use crate::error::NftError;

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum NftEvent {
    Transfer {
        from: Option<Address>,
        to: Address,
        token_id: u64,
    },
    Approval {
        owner: Address,
        spender: Address,
        token_id: u64,
    },
}

#[derive(Clone, Debug)]
pub struct NftRegistry {
    pub address: Address,
    /// May mint new tokens
    pub owner: Address,
    next_token_id: u64,
    owners: BTreeMap<u64, Address>,
    approvals: HashMap<u64, Address>,
    pub events: Vec<NftEvent>,
}

impl NftRegistry {
    pub fn new(address: Address, owner: Address) -> Self {
        Self {
            address,
            owner,
            next_token_id: 1,
            owners: BTreeMap::new(),
            approvals: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn owner_of(&self, token_id: u64) -> Option<Address> {
        self.owners.get(&token_id).copied()
    }

    pub fn approved(&self, token_id: u64) -> Option<Address> {
        self.approvals.get(&token_id).copied()
    }

    pub fn tokens_of(&self, owner: &Address) -> Vec<u64> {
        self.owners
            .iter()
            .filter(|(_, o)| *o == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn mint(&mut self, ctx: &CallContext, to: Address) -> Result<u64, NftError> {
        if ctx.sender != self.owner {
            return Err(NftError::NotMinter);
        }
        let token_id = self.next_token_id;
        self.next_token_id += 1;
        self.owners.insert(token_id, to);
        self.events.push(NftEvent::Transfer {
            from: None,
            to,
            token_id,
        });
        debug!(token_id, to = %short_address(&to), "nft minted");
        Ok(token_id)
    }

    pub fn approve(&mut self, ctx: &CallContext, spender: Address, token_id: u64) -> Result<(), NftError> {
        let owner = self.owner_of(token_id).ok_or(NftError::TokenNotFound(token_id))?;
        if ctx.sender != owner {
            return Err(NftError::Unauthorized {
                caller: ctx.sender,
                token_id,
            });
        }
        self.approvals.insert(token_id, spender);
        self.events.push(NftEvent::Approval {
            owner,
            spender,
            token_id,
        });
        Ok(())
    }

    /// Move a token. The caller must own it or be approved for it; any
    /// approval is cleared by the move.
    pub fn transfer_from(
        &mut self,
        ctx: &CallContext,
        from: Address,
        to: Address,
        token_id: u64,
    ) -> Result<(), NftError> {
        let owner = self.owner_of(token_id).ok_or(NftError::TokenNotFound(token_id))?;
        if owner != from {
            return Err(NftError::NotOwner { from, token_id });
        }
        if ctx.sender != owner && self.approved(token_id) != Some(ctx.sender) {
            return Err(NftError::Unauthorized {
                caller: ctx.sender,
                token_id,
            });
        }

        self.approvals.remove(&token_id);
        self.owners.insert(token_id, to);
        self.events.push(NftEvent::Transfer {
            from: Some(from),
            to,
            token_id,
        });
        debug!(
            token_id,
            from = %short_address(&from),
            to = %short_address(&to),
            "nft transferred"
        );
        Ok(())
    }
}

/// Dispatch a call. Returns the minted token id for `Mint`.
pub fn handle_call(registry: &mut NftRegistry, ctx: &CallContext, call: NftCall) -> Result<Option<u64>, NftError> {
    match call {
        NftCall::Mint { to } => registry.mint(ctx, to).map(Some),
        NftCall::Approve { spender, token_id } => registry.approve(ctx, spender, token_id).map(|_| None),
        NftCall::TransferFrom { from, to, token_id } => {
            registry.transfer_from(ctx, from, to, token_id).map(|_| None)
        }
    }
}

pub fn handle_query(registry: &NftRegistry, query: NftQuery) -> NftQueryResponse {
    match query {
        NftQuery::OwnerOf { token_id } => NftQueryResponse::Owner(registry.owner_of(token_id)),
        NftQuery::Approved { token_id } => NftQueryResponse::Approved(registry.approved(token_id)),
        NftQuery::TokensOf { owner } => NftQueryResponse::Tokens(registry.tokens_of(&owner)),
    }
}
