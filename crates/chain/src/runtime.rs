//! Sequential transaction runtime.
//!
//! Holds every contract's state next to the shared executor and gateway and
//! applies one call at a time against a simulated clock. A call that fails
//! leaves no trace: the ciphertext store is rolled back from its journal and
//! the contract states from a checkpoint taken before dispatch (event logs
//! are truncated, not copied). After a successful call, ciphertexts the call
//! sealed or released that no contract refers to any more are pruned.
//!
//! Contract addresses are never accepted as transaction senders; contracts
//! act only through the runtime.
//!
//! Decryption results reach contracts only through
//! [`RuntimeCall::FulfillDecryption`], which is always a later transaction
//! than the one that filed the request.

use std::collections::HashSet;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sealed_auction::{AuctionCall, AuctionEnv, AuctionEvent, AuctionOutput, AuctionState};
use sealed_fhe::{
    DecryptionCallback, DecryptionResult, FheExecutor, Gateway, GatewayCheckpoint, RequestId,
};
use sealed_nft::{NftCall, NftEvent, NftRegistry};
use sealed_token::{TokenCall, TokenEvent, TokenState};
use sealed_types::{
    address_from_label, short_address, Address, AuctionOutcome, CallContext, CancelReason,
    EncryptedValue, Handle, NetworkPublicKey,
};

use crate::error::ChainError;
use crate::genesis::{parse_address, GenesisConfig};

/// Seconds the clock moves per block when none is given.
pub const BLOCK_TIME_SECS: u64 = 12;

/// Fixed contract addresses of the devnet.
pub fn token_address() -> Address {
    address_from_label("contract:token")
}

pub fn nft_address() -> Address {
    address_from_label("contract:nft")
}

pub fn auction_address() -> Address {
    address_from_label("contract:auction")
}

fn contract_addresses() -> [Address; 3] {
    [token_address(), nft_address(), auction_address()]
}

/// Sender of relayer transactions.
pub fn relayer_address() -> Address {
    address_from_label("relayer")
}

/// A transaction payload.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum RuntimeCall {
    Token(TokenCall),
    Nft(NftCall),
    Auction(AuctionCall),

    /// Ask the gateway to decrypt `values` for the sender. The result is
    /// held for the sender to collect.
    RequestDecryption { values: Vec<EncryptedValue> },

    /// Relayer step: decrypt a pending request and deliver the result.
    FulfillDecryption { request_id: RequestId },
}

/// Every contract's state plus the shared executor and gateway.
#[derive(Clone, Debug)]
pub struct ChainState {
    pub fhe: FheExecutor,
    pub gateway: Gateway,
    pub token: TokenState,
    pub nft: NftRegistry,
    pub auction: AuctionState,
}

/// Event emitted by a contract during a call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    Token(TokenEvent),
    Nft(NftEvent),
    Auction(AuctionEvent),
}

/// What a call returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallOutput {
    None,
    /// Encrypted transfer flag or escrowed bid handle
    Encrypted(EncryptedValue),
    TokenId(u64),
    AuctionId(u64),
    DecryptionRequested(RequestId),
    /// A principal's result was stored for collection
    Delivered(RequestId),
    Settled(AuctionOutcome),
    Cancelled(CancelReason),
}

/// Receipt of an applied call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub block_height: u64,
    pub timestamp: u64,
    pub sender: Address,
    pub output: CallOutput,
    pub events: Vec<RuntimeEvent>,
}

impl Receipt {
    /// Gateway request filed by this call, if any.
    pub fn request_id(&self) -> Option<RequestId> {
        match self.output {
            CallOutput::DecryptionRequested(id) => Some(id),
            _ => None,
        }
    }
}

/// Event log positions, used to slice out one call's events.
#[derive(Clone, Copy)]
struct EventMarks {
    token: usize,
    nft: usize,
    auction: usize,
}

/// A contract state with an append-only event log.
trait EventLog: Clone {
    type Event;

    fn log(&mut self) -> &mut Vec<Self::Event>;

    /// Copy of the state with an empty log.
    fn snapshot(&mut self) -> Self {
        let events = std::mem::take(self.log());
        let copy = self.clone();
        *self.log() = events;
        copy
    }

    /// Return to `saved`, keeping the first `len` events of the live log.
    fn restore(&mut self, saved: Self, len: usize) {
        let mut events = std::mem::take(self.log());
        events.truncate(len);
        *self = saved;
        *self.log() = events;
    }
}

impl EventLog for TokenState {
    type Event = TokenEvent;

    fn log(&mut self) -> &mut Vec<TokenEvent> {
        &mut self.events
    }
}

impl EventLog for NftRegistry {
    type Event = NftEvent;

    fn log(&mut self) -> &mut Vec<NftEvent> {
        &mut self.events
    }
}

impl EventLog for AuctionState {
    type Event = AuctionEvent;

    fn log(&mut self) -> &mut Vec<AuctionEvent> {
        &mut self.events
    }
}

/// Contract states as they were before a call.
struct Checkpoint {
    gateway: GatewayCheckpoint,
    token: TokenState,
    nft: NftRegistry,
    auction: AuctionState,
    marks: EventMarks,
}

/// The runtime.
#[derive(Clone, Debug)]
pub struct Chain {
    state: ChainState,
    /// Current block height (one block per applied call)
    block_height: u64,
    /// Current timestamp (simulated, can be advanced)
    timestamp: u64,
}

impl Chain {
    /// Build the chain described by `config`, including initial mints.
    pub fn from_genesis(config: &GenesisConfig) -> Result<Self, ChainError> {
        config.validate()?;

        let fhe = FheExecutor::from_seed(&config.seed()?)?;
        let token_owner = parse_address(&config.token.owner)?;
        let nft_owner = parse_address(&config.nft.owner)?;

        let mut chain = Self {
            state: ChainState {
                fhe,
                gateway: Gateway::new(config.gateway.request_ttl_secs),
                token: TokenState::new(
                    token_address(),
                    config.token.name.clone(),
                    config.token.symbol.clone(),
                    token_owner,
                ),
                nft: NftRegistry::new(nft_address(), nft_owner),
                auction: AuctionState::new(auction_address(), config.auction.clone()),
            },
            block_height: 0,
            timestamp: config.genesis_time,
        };

        for contract in contract_addresses() {
            chain.state.token.register_contract(contract);
        }

        let ctx = chain.context(token_owner);
        for mint in &config.token.initial_mints {
            let to = parse_address(&mint.to)?;
            let state = &mut chain.state;
            sealed_token::handlers::handle_mint(&mut state.token, &mut state.fhe, &ctx, to, mint.amount)?;
        }

        let ctx = chain.context(nft_owner);
        for holder in &config.nft.initial_holders {
            let to = parse_address(holder)?;
            chain.state.nft.mint(&ctx, to)?;
        }

        let live = chain.live_handles();
        chain.state.fhe.retain_live(&live);

        info!(
            token = %config.token.symbol,
            supply = chain.state.token.total_supply,
            nfts = config.nft.initial_holders.len(),
            "chain initialized from genesis"
        );
        Ok(chain)
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn network_key(&self) -> NetworkPublicKey {
        self.state.fhe.public_key()
    }

    /// Advance the clock by one block interval.
    pub fn advance_block(&mut self) {
        self.advance_time(BLOCK_TIME_SECS);
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.timestamp = self.timestamp.saturating_add(secs);
    }

    /// Set the current timestamp (for testing time-dependent logic).
    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }

    /// Off-chain read of a ciphertext by one of its viewers.
    pub fn view(&self, value: &EncryptedValue, principal: &Address) -> Result<u64, ChainError> {
        Ok(self.state.fhe.view(value, principal)?)
    }

    /// Collect decryption results held for `principal`.
    pub fn take_decrypted(&mut self, principal: &Address) -> Vec<DecryptionResult> {
        self.state.gateway.take_delivered(principal)
    }

    /// Apply one call from `sender`.
    ///
    /// Contract addresses are rejected with [`ChainError::ReservedSender`].
    pub fn submit(&mut self, sender: Address, call: RuntimeCall) -> Result<Receipt, ChainError> {
        if contract_addresses().contains(&sender) {
            warn!(sender = %short_address(&sender), "call from a contract address rejected");
            return Err(ChainError::ReservedSender(short_address(&sender)));
        }

        let checkpoint = self.checkpoint();
        let held_before: Vec<Handle> = self.contract_handles().collect();
        let ctx = self.context(sender);

        self.state.fhe.begin();
        match self.dispatch(&ctx, call) {
            Ok(output) => {
                let sealed = self.state.fhe.commit();
                let pruned = self.prune(sealed.into_iter().chain(held_before), &output);
                self.block_height += 1;
                debug!(pruned, live = self.state.fhe.len(), "call applied");
                Ok(Receipt {
                    block_height: ctx.block_height,
                    timestamp: ctx.timestamp,
                    sender,
                    output,
                    events: self.events_since(checkpoint.marks),
                })
            }
            Err(e) => {
                self.state.fhe.rollback();
                self.restore(checkpoint);
                warn!(sender = %short_address(&sender), error = %e, "call rejected, state restored");
                Err(e)
            }
        }
    }

    /// Expire stale requests, then fulfil every pending one in issue order.
    ///
    /// Each fulfilment is its own transaction; one failing does not stop
    /// the rest.
    pub fn relay_pending(&mut self) -> Vec<Result<Receipt, ChainError>> {
        let expired = self.state.gateway.expire_stale(self.timestamp);
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired stale decryption requests");
        }

        self.state
            .gateway
            .pending_requests()
            .into_iter()
            .map(|request_id| {
                self.submit(relayer_address(), RuntimeCall::FulfillDecryption { request_id })
            })
            .collect()
    }

    fn context(&self, sender: Address) -> CallContext {
        CallContext {
            sender,
            block_height: self.block_height,
            timestamp: self.timestamp,
        }
    }

    fn dispatch(&mut self, ctx: &CallContext, call: RuntimeCall) -> Result<CallOutput, ChainError> {
        let state = &mut self.state;
        match call {
            RuntimeCall::Token(call) => {
                let flag = sealed_token::handlers::handle_call(&mut state.token, &mut state.fhe, ctx, call)?;
                Ok(flag.map_or(CallOutput::None, CallOutput::Encrypted))
            }

            RuntimeCall::Nft(call) => {
                let minted = sealed_nft::handle_call(&mut state.nft, ctx, call)?;
                Ok(minted.map_or(CallOutput::None, CallOutput::TokenId))
            }

            RuntimeCall::Auction(call) => {
                let mut env = AuctionEnv {
                    fhe: &mut state.fhe,
                    gateway: &mut state.gateway,
                    token: &mut state.token,
                    nft: &mut state.nft,
                };
                let output = sealed_auction::handle_call(&mut state.auction, &mut env, ctx, call)?;
                Ok(auction_output(output))
            }

            RuntimeCall::RequestDecryption { values } => {
                let request_id = state.gateway.request_decryption(
                    &state.fhe,
                    ctx.sender,
                    &values,
                    DecryptionCallback::Principal,
                    ctx.timestamp,
                )?;
                Ok(CallOutput::DecryptionRequested(request_id))
            }

            RuntimeCall::FulfillDecryption { request_id } => {
                let result = state.gateway.fulfill(&state.fhe, &request_id, ctx.timestamp)?;
                self.deliver(ctx, result)
            }
        }
    }

    /// Route a fulfilled request to its callback.
    fn deliver(&mut self, ctx: &CallContext, result: DecryptionResult) -> Result<CallOutput, ChainError> {
        match result.callback {
            DecryptionCallback::Principal => Ok(CallOutput::Delivered(result.request_id)),

            DecryptionCallback::Contract {
                contract,
                correlation,
            } if contract == self.state.auction.address => {
                let winner_index = *result.plaintexts.first().ok_or(ChainError::EmptyDecryption)?;
                let state = &mut self.state;
                let mut env = AuctionEnv {
                    fhe: &mut state.fhe,
                    gateway: &mut state.gateway,
                    token: &mut state.token,
                    nft: &mut state.nft,
                };
                let output = sealed_auction::handle_winner_revealed(
                    &mut state.auction,
                    &mut env,
                    &ctx.as_contract(contract),
                    correlation,
                    result.request_id,
                    winner_index,
                )?;
                Ok(auction_output(output))
            }

            DecryptionCallback::Contract { contract, .. } => {
                Err(ChainError::UnknownCallback(short_address(&contract)))
            }
        }
    }

    fn checkpoint(&mut self) -> Checkpoint {
        let marks = self.event_marks();
        let state = &mut self.state;
        Checkpoint {
            gateway: state.gateway.checkpoint(),
            token: state.token.snapshot(),
            nft: state.nft.snapshot(),
            auction: state.auction.snapshot(),
            marks,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        let state = &mut self.state;
        state.gateway.restore(checkpoint.gateway);
        state.token.restore(checkpoint.token, checkpoint.marks.token);
        state.nft.restore(checkpoint.nft, checkpoint.marks.nft);
        state.auction.restore(checkpoint.auction, checkpoint.marks.auction);
    }

    /// Ciphertexts held in contract state.
    fn contract_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.state.token.handles().chain(self.state.auction.handles())
    }

    /// Contract-held ciphertexts plus those awaiting decryption.
    fn live_handles(&self) -> HashSet<Handle> {
        self.contract_handles()
            .chain(self.state.gateway.pending_handles())
            .collect()
    }

    /// Drop every candidate that is neither live nor returned by the call.
    fn prune(&mut self, candidates: impl IntoIterator<Item = Handle>, output: &CallOutput) -> usize {
        let mut live = self.live_handles();
        match output {
            CallOutput::Encrypted(value) => {
                live.insert(value.handle);
            }
            CallOutput::Settled(outcome) => {
                live.insert(outcome.clearing_price.handle);
                live.insert(outcome.winner_index.handle);
            }
            _ => {}
        }
        self.state.fhe.prune(candidates, &live)
    }

    fn event_marks(&self) -> EventMarks {
        EventMarks {
            token: self.state.token.events.len(),
            nft: self.state.nft.events.len(),
            auction: self.state.auction.events.len(),
        }
    }

    fn events_since(&self, marks: EventMarks) -> Vec<RuntimeEvent> {
        let token = self.state.token.events[marks.token..]
            .iter()
            .cloned()
            .map(RuntimeEvent::Token);
        let nft = self.state.nft.events[marks.nft..]
            .iter()
            .cloned()
            .map(RuntimeEvent::Nft);
        let auction = self.state.auction.events[marks.auction..]
            .iter()
            .cloned()
            .map(RuntimeEvent::Auction);
        token.chain(nft).chain(auction).collect()
    }
}

fn auction_output(output: AuctionOutput) -> CallOutput {
    match output {
        AuctionOutput::Created(id) => CallOutput::AuctionId(id),
        AuctionOutput::BidPlaced(escrowed) => CallOutput::Encrypted(escrowed),
        AuctionOutput::SettlementRequested(id) => CallOutput::DecryptionRequested(id),
        AuctionOutput::Settled(outcome) => CallOutput::Settled(outcome),
        AuctionOutput::Cancelled(reason) => CallOutput::Cancelled(reason),
    }
}
