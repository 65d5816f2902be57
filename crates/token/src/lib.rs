//! Confidential fungible token.
//!
//! Balances and allowances are [`EncryptedValue`]s held in the executor's
//! store. Transfers never branch on an encrypted amount: an encrypted `ok`
//! flag is computed and both sides are updated with `select`, so a transfer
//! of more than the balance moves nothing and still succeeds.
//!
//! - `call`: message types for state-changing operations
//! - `handlers`: business logic for processing calls
//! - `queries`: read-only state access
//! - `state`: ledger state
//! - `error`: error types
//!
//! [`EncryptedValue`]: sealed_types::EncryptedValue

pub mod call;
pub mod error;
pub mod handlers;
pub mod queries;
pub mod state;

pub use call::TokenCall;
pub use error::TokenError;
pub use handlers::HandlerResult;
pub use queries::{TokenQuery, TokenQueryResponse};
pub use state::{TokenEvent, TokenState, DECIMALS};

use sealed_fhe::FheExecutor;
use sealed_types::{Address, CallContext, EncryptedValue};

/// Encrypted transfers other contracts can drive.
///
/// `ctx.sender` is the calling contract. `amount` must be usable by the
/// caller and the ledger must be admitted on it as a compute domain. The
/// returned flag is admitted to the caller.
pub trait ConfidentialLedger {
    fn address(&self) -> Address;

    fn transfer_encrypted(
        &mut self,
        fhe: &mut FheExecutor,
        ctx: &CallContext,
        to: Address,
        amount: EncryptedValue,
    ) -> Result<EncryptedValue, TokenError>;

    fn transfer_from_encrypted(
        &mut self,
        fhe: &mut FheExecutor,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: EncryptedValue,
    ) -> Result<EncryptedValue, TokenError>;
}

impl ConfidentialLedger for TokenState {
    fn address(&self) -> Address {
        self.address
    }

    fn transfer_encrypted(
        &mut self,
        fhe: &mut FheExecutor,
        ctx: &CallContext,
        to: Address,
        amount: EncryptedValue,
    ) -> Result<EncryptedValue, TokenError> {
        handlers::handle_transfer_encrypted(self, fhe, ctx, to, amount)
    }

    fn transfer_from_encrypted(
        &mut self,
        fhe: &mut FheExecutor,
        ctx: &CallContext,
        from: Address,
        to: Address,
        amount: EncryptedValue,
    ) -> Result<EncryptedValue, TokenError> {
        handlers::handle_transfer_from_encrypted(self, fhe, ctx, from, to, amount)
    }
}
