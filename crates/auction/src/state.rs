//! Auction engine state.

use std::collections::{BTreeMap, HashMap};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sealed_types::{Address, AuctionConfig, AuctionOutcome, AuctionPhase, Bid, CancelReason, Handle};

/// Limits applied to every auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionParams {
    /// Bound on distinct bidders per auction (settlement is linear in it)
    pub max_bidders: u32,
    /// Minimum bidding window in seconds
    pub min_duration: u64,
}

impl Default for AuctionParams {
    fn default() -> Self {
        Self {
            max_bidders: 64,
            min_duration: 60,
        }
    }
}

/// Auction events. Bid amounts and the clearing price never appear.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum AuctionEvent {
    AuctionCreated {
        auction_id: u64,
        seller: Address,
        token_id: u64,
    },
    BidPlaced {
        auction_id: u64,
        bidder: Address,
        sequence: u64,
    },
    BidRefunded {
        auction_id: u64,
        bidder: Address,
    },
    SettlementRequested {
        auction_id: u64,
        request_id: [u8; 32],
    },
    AuctionSettled {
        auction_id: u64,
        winner: Address,
    },
    AuctionCancelled {
        auction_id: u64,
        reason: CancelReason,
    },
}

#[derive(Clone, Debug)]
pub struct AuctionState {
    /// Contract address: NFT escrow holder, token spender, compute domain
    pub address: Address,
    pub params: AuctionParams,

    /// Next auction ID to assign
    pub next_auction_id: u64,

    /// All auctions by ID
    pub auctions: BTreeMap<u64, AuctionConfig>,

    /// Live bids: (auction_id, bidder) -> bid
    pub bids: HashMap<(u64, Address), Bid>,

    /// Bidders per auction, in order of their current bid's sequence
    pub auction_bidders: HashMap<u64, Vec<Address>>,

    /// Per-auction bid sequence counters
    pub bid_sequence: HashMap<u64, u64>,

    /// Settlement results
    pub results: HashMap<u64, AuctionOutcome>,

    pub events: Vec<AuctionEvent>,
}

impl AuctionState {
    pub fn new(address: Address, params: AuctionParams) -> Self {
        Self {
            address,
            params,
            next_auction_id: 1,
            auctions: BTreeMap::new(),
            bids: HashMap::new(),
            auction_bidders: HashMap::new(),
            bid_sequence: HashMap::new(),
            results: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Get the next auction ID and increment.
    pub fn allocate_auction_id(&mut self) -> u64 {
        let id = self.next_auction_id;
        self.next_auction_id += 1;
        id
    }

    pub fn allocate_bid_sequence(&mut self, auction_id: u64) -> u64 {
        let counter = self.bid_sequence.entry(auction_id).or_insert(0);
        let sequence = *counter;
        *counter += 1;
        sequence
    }

    pub fn get_auction(&self, auction_id: u64) -> Option<&AuctionConfig> {
        self.auctions.get(&auction_id)
    }

    pub fn get_auction_mut(&mut self, auction_id: u64) -> Option<&mut AuctionConfig> {
        self.auctions.get_mut(&auction_id)
    }

    pub fn bidders(&self, auction_id: u64) -> &[Address] {
        self.auction_bidders
            .get(&auction_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Bids for an auction, in sequence order.
    pub fn get_auction_bids(&self, auction_id: u64) -> Vec<&Bid> {
        self.bidders(auction_id)
            .iter()
            .filter_map(|bidder| self.bids.get(&(auction_id, *bidder)))
            .collect()
    }

    pub fn remove_bid(&mut self, auction_id: u64, bidder: &Address) -> Option<Bid> {
        if let Some(bidders) = self.auction_bidders.get_mut(&auction_id) {
            bidders.retain(|b| b != bidder);
        }
        self.bids.remove(&(auction_id, *bidder))
    }

    /// Drop every bid of a finished auction.
    pub fn clear_bids(&mut self, auction_id: u64) {
        for bidder in self.auction_bidders.remove(&auction_id).unwrap_or_default() {
            self.bids.remove(&(auction_id, bidder));
        }
    }

    /// Auctions not yet settled or cancelled at `timestamp`.
    pub fn active_auctions(&self, timestamp: u64) -> Vec<&AuctionConfig> {
        self.auctions
            .values()
            .filter(|a| !a.phase_at(timestamp).is_terminal())
            .collect()
    }

    pub fn phase_of(&self, auction_id: u64, timestamp: u64) -> Option<AuctionPhase> {
        self.get_auction(auction_id).map(|a| a.phase_at(timestamp))
    }

    /// Every ciphertext held by live bids, pending settlements and results.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        let bids = self.bids.values().map(|bid| bid.amount.handle);
        let pending = self
            .auctions
            .values()
            .filter_map(|a| a.pending.as_ref())
            .flat_map(|p| [p.winner_index.handle, p.clearing_price.handle]);
        let results = self
            .results
            .values()
            .flat_map(|r| [r.clearing_price.handle, r.winner_index.handle]);
        bids.chain(pending).chain(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_types::{EncryptedValue, FheType, Handle};

    fn bid(bidder: Address, sequence: u64) -> Bid {
        Bid {
            bidder,
            amount: EncryptedValue {
                handle: Handle([sequence as u8; 32]),
                ty: FheType::U64,
            },
            sequence,
            submitted_at: 0,
        }
    }

    #[test]
    fn test_allocate_ids() {
        let mut state = AuctionState::new([0u8; 32], AuctionParams::default());
        assert_eq!(state.allocate_auction_id(), 1);
        assert_eq!(state.allocate_auction_id(), 2);
        assert_eq!(state.allocate_bid_sequence(1), 0);
        assert_eq!(state.allocate_bid_sequence(1), 1);
        assert_eq!(state.allocate_bid_sequence(2), 0);
    }

    #[test]
    fn test_remove_and_clear_bids() {
        let mut state = AuctionState::new([0u8; 32], AuctionParams::default());
        for (i, bidder) in [[1u8; 32], [2u8; 32], [3u8; 32]].into_iter().enumerate() {
            state.bids.insert((7, bidder), bid(bidder, i as u64));
            state.auction_bidders.entry(7).or_default().push(bidder);
        }

        assert!(state.remove_bid(7, &[2u8; 32]).is_some());
        assert_eq!(state.bidders(7), &[[1u8; 32], [3u8; 32]]);
        assert_eq!(state.get_auction_bids(7).len(), 2);

        state.clear_bids(7);
        assert!(state.bidders(7).is_empty());
        assert!(state.bids.is_empty());
    }
}
