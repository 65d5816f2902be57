//! Call handlers for the token ledger.
//!
//! Every path that depends on an encrypted amount runs both branches and
//! picks the result with `select`. The only hard errors are authorization,
//! supply overflow and failures from the arithmetic layer.

use tracing::debug;

use sealed_fhe::{FheContext, FheError, FheExecutor};
use sealed_types::{short_address, Address, CallContext, EncryptedValue, ExternalInput, FheType};

use crate::call::TokenCall;
use crate::error::TokenError;
use crate::state::{TokenEvent, TokenState};

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, TokenError>;

/// Dispatch a call. Returns the encrypted success flag for transfers.
pub fn handle_call(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    call: TokenCall,
) -> HandlerResult<Option<EncryptedValue>> {
    match call {
        TokenCall::Mint { to, amount } => {
            handle_mint(state, fhe, ctx, to, amount)?;
            Ok(None)
        }
        TokenCall::Transfer { to, amount } => handle_transfer(state, fhe, ctx, to, &amount).map(Some),
        TokenCall::TransferEncrypted { to, amount } => {
            handle_transfer_encrypted(state, fhe, ctx, to, amount).map(Some)
        }
        TokenCall::Approve { spender, amount } => {
            handle_approve(state, fhe, ctx, spender, &amount)?;
            Ok(None)
        }
        TokenCall::ApproveEncrypted { spender, amount } => {
            handle_approve_encrypted(state, fhe, ctx, spender, amount)?;
            Ok(None)
        }
        TokenCall::TransferFrom { from, to, amount } => {
            handle_transfer_from(state, fhe, ctx, from, to, &amount).map(Some)
        }
        TokenCall::TransferFromEncrypted { from, to, amount } => {
            handle_transfer_from_encrypted(state, fhe, ctx, from, to, amount).map(Some)
        }
    }
}

/// Handle Mint call.
pub fn handle_mint(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    to: Address,
    amount: u64,
) -> HandlerResult<()> {
    if ctx.sender != state.owner {
        return Err(TokenError::Unauthorized(ctx.sender));
    }
    let total_supply = state
        .total_supply
        .checked_add(amount)
        .ok_or(TokenError::SupplyOverflow)?;

    let mut fx = fhe.context(state.address);
    let balance = state.balance_or_zero(&mut fx, &to)?;
    let minted = fx.trivial(amount, FheType::U64)?;
    // Cannot saturate: every balance is bounded by the supply.
    let new_balance = fx.add(&balance, &minted)?;
    state.grant_reader(&mut fx, &new_balance, to)?;

    state.balances.insert(to, new_balance);
    state.total_supply = total_supply;
    state.emit(TokenEvent::Mint { to, amount });

    debug!(to = %short_address(&to), amount, total_supply, "minted");
    Ok(())
}

/// Handle Transfer call.
pub fn handle_transfer(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    to: Address,
    input: &ExternalInput,
) -> HandlerResult<EncryptedValue> {
    let amount = fhe.context(state.address).verify_input(input, &ctx.sender)?;
    transfer(state, fhe, ctx.sender, to, &amount)
}

/// Handle TransferEncrypted call.
pub fn handle_transfer_encrypted(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    to: Address,
    amount: EncryptedValue,
) -> HandlerResult<EncryptedValue> {
    ensure_usable(fhe, ctx, &amount)?;
    transfer(state, fhe, ctx.sender, to, &amount)
}

/// Handle Approve call.
pub fn handle_approve(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    spender: Address,
    input: &ExternalInput,
) -> HandlerResult<()> {
    let amount = fhe.context(state.address).verify_input(input, &ctx.sender)?;
    approve(state, fhe, ctx.sender, spender, &amount)
}

/// Handle ApproveEncrypted call.
pub fn handle_approve_encrypted(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    spender: Address,
    amount: EncryptedValue,
) -> HandlerResult<()> {
    ensure_usable(fhe, ctx, &amount)?;
    approve(state, fhe, ctx.sender, spender, &amount)
}

/// Handle TransferFrom call. The caller is the spender.
pub fn handle_transfer_from(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    from: Address,
    to: Address,
    input: &ExternalInput,
) -> HandlerResult<EncryptedValue> {
    let amount = fhe.context(state.address).verify_input(input, &ctx.sender)?;
    transfer_from(state, fhe, ctx.sender, from, to, &amount)
}

/// Handle TransferFromEncrypted call.
pub fn handle_transfer_from_encrypted(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    ctx: &CallContext,
    from: Address,
    to: Address,
    amount: EncryptedValue,
) -> HandlerResult<EncryptedValue> {
    ensure_usable(fhe, ctx, &amount)?;
    transfer_from(state, fhe, ctx.sender, from, to, &amount)
}

fn ensure_usable(fhe: &FheExecutor, ctx: &CallContext, amount: &EncryptedValue) -> HandlerResult<()> {
    if !fhe.is_allowed(amount, &ctx.sender) {
        return Err(TokenError::CiphertextNotAllowed(ctx.sender));
    }
    Ok(())
}

fn transfer(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    from: Address,
    to: Address,
    amount: &EncryptedValue,
) -> HandlerResult<EncryptedValue> {
    let mut fx = fhe.context(state.address);
    let balance = state.balance_or_zero(&mut fx, &from)?;
    let ok = fx.le(amount, &balance)?;

    move_funds(state, &mut fx, from, to, amount, &ok)?;
    hand_flag_to(state, &mut fx, &ok, from)?;
    state.emit(TokenEvent::Transfer { from, to });

    debug!(from = %short_address(&from), to = %short_address(&to), "transfer");
    Ok(ok)
}

fn transfer_from(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    spender: Address,
    from: Address,
    to: Address,
    amount: &EncryptedValue,
) -> HandlerResult<EncryptedValue> {
    let mut fx = fhe.context(state.address);
    let allowance = state.allowance_or_zero(&mut fx, &from, &spender)?;
    let balance = state.balance_or_zero(&mut fx, &from)?;

    let within_allowance = fx.le(amount, &allowance)?;
    let within_balance = fx.le(amount, &balance)?;
    let ok = fx.and(&within_allowance, &within_balance)?;

    let reduced = fx.sub(&allowance, amount)?;
    let new_allowance = fx.select(&ok, &reduced, &allowance)?;
    state.grant_reader(&mut fx, &new_allowance, from)?;
    state.grant_reader(&mut fx, &new_allowance, spender)?;
    state.allowances.insert((from, spender), new_allowance);

    move_funds(state, &mut fx, from, to, amount, &ok)?;
    hand_flag_to(state, &mut fx, &ok, spender)?;
    state.emit(TokenEvent::Transfer { from, to });

    debug!(
        spender = %short_address(&spender),
        from = %short_address(&from),
        to = %short_address(&to),
        "transfer_from"
    );
    Ok(ok)
}

fn approve(
    state: &mut TokenState,
    fhe: &mut FheExecutor,
    owner: Address,
    spender: Address,
    amount: &EncryptedValue,
) -> HandlerResult<()> {
    let mut fx = fhe.context(state.address);
    // Store a ledger-owned copy so later grants never touch the caller's handle.
    let zero = fx.zero(FheType::U64)?;
    let allowance = fx.add(amount, &zero)?;
    state.grant_reader(&mut fx, &allowance, owner)?;
    state.grant_reader(&mut fx, &allowance, spender)?;

    state.allowances.insert((owner, spender), allowance);
    state.emit(TokenEvent::Approval { owner, spender });
    Ok(())
}

/// Debit `from` and credit `to` by `amount` if `ok`, else leave both as is.
fn move_funds(
    state: &mut TokenState,
    fx: &mut FheContext<'_>,
    from: Address,
    to: Address,
    amount: &EncryptedValue,
    ok: &EncryptedValue,
) -> Result<(), FheError> {
    let from_balance = state.balance_or_zero(fx, &from)?;
    let debited = fx.sub(&from_balance, amount)?;
    let new_from = fx.select(ok, &debited, &from_balance)?;
    state.grant_reader(fx, &new_from, from)?;
    state.balances.insert(from, new_from);

    // Read after the debit is stored so that from == to nets to zero.
    let to_balance = state.balance_or_zero(fx, &to)?;
    let zero = fx.zero(FheType::U64)?;
    let credit = fx.select(ok, amount, &zero)?;
    let new_to = fx.add(&to_balance, &credit)?;
    state.grant_reader(fx, &new_to, to)?;
    state.balances.insert(to, new_to);
    Ok(())
}

/// Let the caller compute on the success flag, and read it unless the
/// caller is a contract.
fn hand_flag_to(
    state: &TokenState,
    fx: &mut FheContext<'_>,
    ok: &EncryptedValue,
    caller: Address,
) -> Result<(), FheError> {
    if caller != fx.domain() {
        fx.allow_domain(ok, caller)?;
    }
    state.grant_reader(fx, ok, caller)
}
