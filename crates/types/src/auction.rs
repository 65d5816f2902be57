//! Auction records shared by the auction engine, the runtime and clients.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::{Address, EncryptedValue};

/// Encrypted winner index meaning "no bid qualified".
pub const NO_WINNER: u64 = u64::MAX;

/// Auction lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum AuctionPhase {
    /// Before start_time
    Created,
    /// Accepting bids
    Open,
    /// Bidding ended, awaiting settlement
    Closed,
    /// Winner decryption requested from the gateway
    Settling,
    /// Asset delivered to the winner
    Settled,
    /// Asset returned to the seller
    Cancelled,
}

impl AuctionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, AuctionPhase::Settled | AuctionPhase::Cancelled)
    }
}

/// Why an auction ended without a sale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum CancelReason {
    /// Seller cancelled before bidding closed
    Seller,
    /// Settled with no bidders
    NoBids,
    /// Settled but no bid met the reserve or carried funds
    NoValidBid,
}

/// Full auction configuration and lifecycle record.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub auction_id: u64,
    pub seller: Address,
    /// NFT held in escrow
    pub token_id: u64,

    // Timing
    pub start_time: u64,
    pub end_time: u64,
    pub settlement_deadline: u64,

    // Rules
    pub reserve_price: Option<u64>,

    /// Stored phase. `Open` and `Closed` are derived from the clock, see
    /// [`AuctionConfig::phase_at`].
    pub phase: AuctionPhase,

    pub cancel_reason: Option<CancelReason>,
    pub pending: Option<PendingSettlement>,
}

impl AuctionConfig {
    /// Effective phase at `timestamp`.
    pub fn phase_at(&self, timestamp: u64) -> AuctionPhase {
        match self.phase {
            AuctionPhase::Created | AuctionPhase::Open | AuctionPhase::Closed => {
                if timestamp < self.start_time {
                    AuctionPhase::Created
                } else if timestamp <= self.end_time {
                    AuctionPhase::Open
                } else {
                    AuctionPhase::Closed
                }
            }
            stored => stored,
        }
    }
}

/// A submitted sealed bid.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Bid {
    pub bidder: Address,
    /// Amount actually escrowed (zero if the token pull failed)
    pub amount: EncryptedValue,
    /// Per-auction submission counter; earlier wins ties
    pub sequence: u64,
    pub submitted_at: u64,
}

/// Encrypted settlement awaiting the winner's decryption.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PendingSettlement {
    /// Gateway correlation id
    pub request_id: [u8; 32],
    /// Bidders in the order the encrypted index refers to
    pub order: Vec<Address>,
    pub winner_index: EncryptedValue,
    pub clearing_price: EncryptedValue,
    pub requested_at: u64,
    pub settler: Address,
}

/// Auction settlement result
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct AuctionOutcome {
    pub auction_id: u64,
    pub winner: Address,
    /// Readable by the seller and the winner only
    pub clearing_price: EncryptedValue,
    /// Winner's position in the bid order; readable by the seller and the winner
    pub winner_index: EncryptedValue,
    pub num_bids: u32,
    pub settlement_time: u64,
    pub settler: Address,
}
