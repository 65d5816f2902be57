//! Ledger state.

use std::collections::{HashMap, HashSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sealed_fhe::{FheContext, FheError};
use sealed_types::{Address, EncryptedValue, FheType, Handle};

/// Fixed number of decimals of the token.
pub const DECIMALS: u8 = 6;

/// Ledger events. Transfer amounts never appear.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum TokenEvent {
    Transfer { from: Address, to: Address },
    Approval { owner: Address, spender: Address },
    Mint { to: Address, amount: u64 },
}

/// Token ledger state.
#[derive(Clone, Debug)]
pub struct TokenState {
    /// Contract address; the compute domain of every balance
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub owner: Address,
    /// Plaintext; only `mint` changes it
    pub total_supply: u64,

    /// Encrypted balances by account
    pub balances: HashMap<Address, EncryptedValue>,

    /// Encrypted allowances: (owner, spender) -> cap
    pub allowances: HashMap<(Address, Address), EncryptedValue>,

    /// Contract accounts. They compute on amounts handed to them but are
    /// never viewers of a balance, allowance or flag.
    pub contracts: HashSet<Address>,

    /// Append-only event log
    pub events: Vec<TokenEvent>,
}

impl TokenState {
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>, owner: Address) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals: DECIMALS,
            owner,
            total_supply: 0,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            contracts: HashSet::new(),
            events: Vec::new(),
        }
    }

    pub fn register_contract(&mut self, account: Address) {
        self.contracts.insert(account);
    }

    pub fn is_contract(&self, account: &Address) -> bool {
        self.contracts.contains(account)
    }

    pub fn balance(&self, account: &Address) -> Option<EncryptedValue> {
        self.balances.get(account).copied()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> Option<EncryptedValue> {
        self.allowances.get(&(*owner, *spender)).copied()
    }

    /// Every ciphertext the ledger still refers to.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.balances
            .values()
            .chain(self.allowances.values())
            .map(|value| value.handle)
    }

    /// Balance of `account`, or a fresh encrypted zero for unknown accounts.
    pub(crate) fn balance_or_zero(
        &self,
        ctx: &mut FheContext<'_>,
        account: &Address,
    ) -> Result<EncryptedValue, FheError> {
        match self.balance(account) {
            Some(balance) => Ok(balance),
            None => ctx.zero(FheType::U64),
        }
    }

    pub(crate) fn allowance_or_zero(
        &self,
        ctx: &mut FheContext<'_>,
        owner: &Address,
        spender: &Address,
    ) -> Result<EncryptedValue, FheError> {
        match self.allowance(owner, spender) {
            Some(allowance) => Ok(allowance),
            None => ctx.zero(FheType::U64),
        }
    }

    /// Make `value` readable by `account` unless it is a contract.
    pub(crate) fn grant_reader(
        &self,
        fx: &mut FheContext<'_>,
        value: &EncryptedValue,
        account: Address,
    ) -> Result<(), FheError> {
        if self.is_contract(&account) {
            return Ok(());
        }
        fx.grant_access(value, account)
    }

    pub(crate) fn emit(&mut self, event: TokenEvent) {
        self.events.push(event);
    }
}
