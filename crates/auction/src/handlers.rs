//! Call handlers for the auction engine.
//!
//! Handlers validate everything that is public (phase, caller, timing,
//! capacity) before touching any state, so a rejected call changes nothing.
//! Everything that depends on a bid amount runs under encryption.

use tracing::{debug, info, warn};

use sealed_fhe::{DecryptionCallback, FheExecutor, Gateway, RequestId};
use sealed_nft::NftRegistry;
use sealed_token::ConfidentialLedger;
use sealed_types::{
    short_address, Address, AuctionConfig, AuctionOutcome, AuctionPhase, Bid, CallContext,
    CancelReason, EncryptedValue, ExternalInput, FheType, PendingSettlement, NO_WINNER,
};

use crate::call::AuctionCall;
use crate::error::AuctionError;
use crate::settlement::compute_second_price;
use crate::state::{AuctionEvent, AuctionState};

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, AuctionError>;

/// The other components a handler may drive.
pub struct AuctionEnv<'a, L: ConfidentialLedger> {
    pub fhe: &'a mut FheExecutor,
    pub gateway: &'a mut Gateway,
    pub token: &'a mut L,
    pub nft: &'a mut NftRegistry,
}

/// What a call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuctionOutput {
    Created(u64),
    /// Handle of the escrowed bid; readable by the bidder only
    BidPlaced(EncryptedValue),
    SettlementRequested(RequestId),
    Settled(AuctionOutcome),
    Cancelled(CancelReason),
}

/// Dispatch a call.
pub fn handle_call<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    call: AuctionCall,
) -> HandlerResult<AuctionOutput> {
    match call {
        AuctionCall::CreateAuction {
            token_id,
            start_time,
            end_time,
            settlement_deadline,
            reserve_price,
        } => handle_create_auction(
            state,
            env,
            ctx,
            token_id,
            start_time,
            end_time,
            settlement_deadline,
            reserve_price,
        )
        .map(AuctionOutput::Created),
        AuctionCall::Bid { auction_id, amount } => {
            handle_bid(state, env, ctx, auction_id, &amount).map(AuctionOutput::BidPlaced)
        }
        AuctionCall::Settle { auction_id } => handle_settle(state, env, ctx, auction_id),
        AuctionCall::Cancel { auction_id } => {
            handle_cancel(state, env, ctx, auction_id)?;
            Ok(AuctionOutput::Cancelled(CancelReason::Seller))
        }
    }
}

/// Handle CreateAuction call.
#[allow(clippy::too_many_arguments)]
pub fn handle_create_auction<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    token_id: u64,
    start_time: u64,
    end_time: u64,
    settlement_deadline: u64,
    reserve_price: Option<u64>,
) -> HandlerResult<u64> {
    // Validate timing
    if end_time <= start_time
        || end_time - start_time < state.params.min_duration
        || end_time <= ctx.timestamp
        || settlement_deadline < end_time
    {
        return Err(AuctionError::InvalidTiming);
    }

    // Escrow the NFT; fails unless the seller owns it and approved us.
    let auction = state.address;
    env.nft
        .transfer_from(&ctx.as_contract(auction), ctx.sender, auction, token_id)?;

    let auction_id = state.allocate_auction_id();
    let config = AuctionConfig {
        auction_id,
        seller: ctx.sender,
        token_id,
        start_time,
        end_time,
        settlement_deadline,
        reserve_price,
        phase: AuctionPhase::Created,
        cancel_reason: None,
        pending: None,
    };

    state.auctions.insert(auction_id, config);
    state.auction_bidders.insert(auction_id, Vec::new());
    state.events.push(AuctionEvent::AuctionCreated {
        auction_id,
        seller: ctx.sender,
        token_id,
    });

    info!(auction_id, token_id, seller = %short_address(&ctx.sender), "auction created");
    Ok(auction_id)
}

/// Handle Bid call.
pub fn handle_bid<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    auction_id: u64,
    input: &ExternalInput,
) -> HandlerResult<EncryptedValue> {
    let auction = state
        .get_auction(auction_id)
        .ok_or(AuctionError::AuctionNotFound(auction_id))?;

    let phase = auction.phase_at(ctx.timestamp);
    if phase != AuctionPhase::Open {
        return Err(AuctionError::InvalidStateTransition { phase, action: "bid" });
    }
    if ctx.sender == auction.seller {
        return Err(AuctionError::SellerCannotBid);
    }

    let bidder = ctx.sender;
    let rebid = state.bids.contains_key(&(auction_id, bidder));
    let max_bidders = state.params.max_bidders;
    if !rebid && state.bidders(auction_id).len() >= max_bidders as usize {
        return Err(AuctionError::AuctionFull(max_bidders));
    }

    let contract = state.address;
    let as_auction = ctx.as_contract(contract);
    let ledger = env.token.address();

    let amount = {
        let mut fx = env.fhe.context(contract);
        let amount = fx.verify_input(input, &bidder)?;
        fx.allow_domain(&amount, ledger)?;
        amount
    };

    // A replaced bid is refunded in full before the new one is pulled.
    if let Some(prior) = state.remove_bid(auction_id, &bidder) {
        env.token
            .transfer_encrypted(env.fhe, &as_auction, bidder, prior.amount)?;
        state.events.push(AuctionEvent::BidRefunded { auction_id, bidder });
    }

    let ok = env
        .token
        .transfer_from_encrypted(env.fhe, &as_auction, bidder, contract, amount)?;

    // A failed pull escrows zero: the bid stays but cannot win.
    let escrowed = {
        let mut fx = env.fhe.context(contract);
        let zero = fx.zero(FheType::U64)?;
        let escrowed = fx.select(&ok, &amount, &zero)?;
        fx.allow_domain(&escrowed, ledger)?;
        fx.grant_access(&escrowed, bidder)?;
        escrowed
    };

    let sequence = state.allocate_bid_sequence(auction_id);
    state.bids.insert(
        (auction_id, bidder),
        Bid {
            bidder,
            amount: escrowed,
            sequence,
            submitted_at: ctx.timestamp,
        },
    );
    state.auction_bidders.entry(auction_id).or_default().push(bidder);
    state.events.push(AuctionEvent::BidPlaced {
        auction_id,
        bidder,
        sequence,
    });

    debug!(auction_id, bidder = %short_address(&bidder), sequence, rebid, "bid placed");
    Ok(escrowed)
}

/// Handle Settle call.
///
/// The seller may settle as soon as bidding closes; after the settlement
/// deadline anyone may.
pub fn handle_settle<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    auction_id: u64,
) -> HandlerResult<AuctionOutput> {
    let auction = state
        .get_auction(auction_id)
        .ok_or(AuctionError::AuctionNotFound(auction_id))?;

    let phase = auction.phase_at(ctx.timestamp);
    let retry = match (phase, &auction.pending) {
        (AuctionPhase::Closed, _) => None,
        (AuctionPhase::Settling, Some(pending))
            if env.gateway.is_expired(&pending.request_id, ctx.timestamp) =>
        {
            Some(pending.clone())
        }
        _ => return Err(AuctionError::InvalidStateTransition { phase, action: "settle" }),
    };

    if ctx.timestamp <= auction.settlement_deadline && ctx.sender != auction.seller {
        return Err(AuctionError::Unauthorized(ctx.sender));
    }

    let seller = auction.seller;
    let token_id = auction.token_id;
    let reserve_price = auction.reserve_price;
    let contract = state.address;

    if let Some(pending) = retry {
        warn!(auction_id, "settlement request expired, requesting again");
        let request_id = request_winner(env, contract, auction_id, &pending.winner_index, ctx.timestamp)?;
        if let Some(auction) = state.get_auction_mut(auction_id) {
            auction.pending = Some(PendingSettlement {
                request_id,
                requested_at: ctx.timestamp,
                settler: ctx.sender,
                ..pending
            });
        }
        state.events.push(AuctionEvent::SettlementRequested {
            auction_id,
            request_id,
        });
        return Ok(AuctionOutput::SettlementRequested(request_id));
    }

    let order = state.bidders(auction_id).to_vec();
    if order.is_empty() {
        env.nft
            .transfer_from(&ctx.as_contract(contract), contract, seller, token_id)?;
        finish_cancelled(state, auction_id, CancelReason::NoBids);
        info!(auction_id, "no bids, asset returned to seller");
        return Ok(AuctionOutput::Cancelled(CancelReason::NoBids));
    }

    let bids: Vec<EncryptedValue> = state
        .get_auction_bids(auction_id)
        .iter()
        .map(|bid| bid.amount)
        .collect();

    let settlement = {
        let mut fx = env.fhe.context(contract);
        let settlement = compute_second_price(&mut fx, &bids, reserve_price)?;
        fx.grant_access(&settlement.winner_index, seller)?;
        fx.grant_access(&settlement.winner_index, contract)?;
        settlement
    };

    let request_id = request_winner(env, contract, auction_id, &settlement.winner_index, ctx.timestamp)?;

    if let Some(auction) = state.get_auction_mut(auction_id) {
        auction.phase = AuctionPhase::Settling;
        auction.pending = Some(PendingSettlement {
            request_id,
            order,
            winner_index: settlement.winner_index,
            clearing_price: settlement.clearing_price,
            requested_at: ctx.timestamp,
            settler: ctx.sender,
        });
    }
    state.events.push(AuctionEvent::SettlementRequested {
        auction_id,
        request_id,
    });

    info!(auction_id, bids = bids.len(), "winner computed, decryption requested");
    Ok(AuctionOutput::SettlementRequested(request_id))
}

/// Gateway callback carrying the decrypted winner index.
pub fn handle_winner_revealed<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    auction_id: u64,
    request_id: RequestId,
    winner_index: u64,
) -> HandlerResult<AuctionOutput> {
    let auction = state
        .get_auction(auction_id)
        .ok_or(AuctionError::AuctionNotFound(auction_id))?;

    let pending = match (&auction.phase, &auction.pending) {
        (AuctionPhase::Settling, Some(pending)) => pending.clone(),
        _ => {
            return Err(AuctionError::InvalidStateTransition {
                phase: auction.phase,
                action: "reveal winner",
            })
        }
    };
    if pending.request_id != request_id {
        return Err(AuctionError::CorrelationMismatch);
    }

    let seller = auction.seller;
    let token_id = auction.token_id;
    let contract = state.address;
    let as_auction = ctx.as_contract(contract);
    let ledger = env.token.address();

    let winner = match usize::try_from(winner_index)
        .ok()
        .filter(|_| winner_index != NO_WINNER)
        .and_then(|i| pending.order.get(i))
    {
        Some(winner) => *winner,
        None => {
            refund_all(state, env, &as_auction, auction_id)?;
            env.nft.transfer_from(&as_auction, contract, seller, token_id)?;
            finish_cancelled(state, auction_id, CancelReason::NoValidBid);
            info!(auction_id, "no valid bid, asset returned to seller");
            return Ok(AuctionOutput::Cancelled(CancelReason::NoValidBid));
        }
    };

    let price = pending.clearing_price;
    let winning_bid = state
        .bids
        .get(&(auction_id, winner))
        .map(|bid| bid.amount)
        .ok_or(AuctionError::CorrelationMismatch)?;

    let change = {
        let mut fx = env.fhe.context(contract);
        // The price never exceeds the winning bid.
        let change = fx.sub(&winning_bid, &price)?;
        fx.allow_domain(&change, ledger)?;
        fx.allow_domain(&price, ledger)?;
        fx.grant_access(&price, seller)?;
        fx.grant_access(&price, winner)?;
        fx.grant_access(&pending.winner_index, winner)?;
        change
    };

    env.nft.transfer_from(&as_auction, contract, winner, token_id)?;
    env.token.transfer_encrypted(env.fhe, &as_auction, seller, price)?;
    env.token.transfer_encrypted(env.fhe, &as_auction, winner, change)?;

    let losers: Vec<Bid> = state
        .get_auction_bids(auction_id)
        .into_iter()
        .filter(|bid| bid.bidder != winner)
        .cloned()
        .collect();
    for bid in &losers {
        env.token
            .transfer_encrypted(env.fhe, &as_auction, bid.bidder, bid.amount)?;
    }

    let outcome = AuctionOutcome {
        auction_id,
        winner,
        clearing_price: price,
        winner_index: pending.winner_index,
        num_bids: pending.order.len() as u32,
        settlement_time: ctx.timestamp,
        settler: pending.settler,
    };

    if let Some(auction) = state.get_auction_mut(auction_id) {
        auction.phase = AuctionPhase::Settled;
        auction.pending = None;
    }
    state.clear_bids(auction_id);
    state.results.insert(auction_id, outcome.clone());
    state.events.push(AuctionEvent::AuctionSettled { auction_id, winner });

    info!(auction_id, winner = %short_address(&winner), "auction settled");
    Ok(AuctionOutput::Settled(outcome))
}

/// Handle Cancel call.
pub fn handle_cancel<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    ctx: &CallContext,
    auction_id: u64,
) -> HandlerResult<()> {
    let auction = state
        .get_auction(auction_id)
        .ok_or(AuctionError::AuctionNotFound(auction_id))?;

    let phase = auction.phase_at(ctx.timestamp);
    if !matches!(phase, AuctionPhase::Created | AuctionPhase::Open) {
        return Err(AuctionError::InvalidStateTransition { phase, action: "cancel" });
    }
    if ctx.sender != auction.seller {
        return Err(AuctionError::Unauthorized(ctx.sender));
    }

    let seller = auction.seller;
    let token_id = auction.token_id;
    let contract = state.address;
    let as_auction = ctx.as_contract(contract);

    refund_all(state, env, &as_auction, auction_id)?;
    env.nft.transfer_from(&as_auction, contract, seller, token_id)?;
    finish_cancelled(state, auction_id, CancelReason::Seller);

    info!(auction_id, "auction cancelled by seller");
    Ok(())
}

fn request_winner<L: ConfidentialLedger>(
    env: &mut AuctionEnv<'_, L>,
    contract: Address,
    auction_id: u64,
    winner_index: &EncryptedValue,
    now: u64,
) -> HandlerResult<RequestId> {
    let callback = DecryptionCallback::Contract {
        contract,
        correlation: auction_id,
    };
    Ok(env
        .gateway
        .request_decryption(env.fhe, contract, &[*winner_index], callback, now)?)
}

fn refund_all<L: ConfidentialLedger>(
    state: &mut AuctionState,
    env: &mut AuctionEnv<'_, L>,
    as_auction: &CallContext,
    auction_id: u64,
) -> HandlerResult<()> {
    let bids: Vec<Bid> = state.get_auction_bids(auction_id).into_iter().cloned().collect();
    for bid in bids {
        env.token
            .transfer_encrypted(env.fhe, as_auction, bid.bidder, bid.amount)?;
        state.events.push(AuctionEvent::BidRefunded {
            auction_id,
            bidder: bid.bidder,
        });
    }
    Ok(())
}

fn finish_cancelled(state: &mut AuctionState, auction_id: u64, reason: CancelReason) {
    if let Some(auction) = state.get_auction_mut(auction_id) {
        auction.phase = AuctionPhase::Cancelled;
        auction.cancel_reason = Some(reason);
        auction.pending = None;
    }
    state.clear_bids(auction_id);
    state.events.push(AuctionEvent::AuctionCancelled { auction_id, reason });
}
