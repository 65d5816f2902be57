//! Query handlers for the auction engine.

use serde::{Deserialize, Serialize};

use sealed_types::{Address, AuctionConfig, AuctionOutcome, AuctionPhase, Bid};

use crate::state::AuctionState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuctionQuery {
    GetAuction { auction_id: u64 },

    /// Effective phase at `timestamp`.
    GetPhase { auction_id: u64, timestamp: u64 },

    /// Auctions not yet settled or cancelled.
    ListActive { timestamp: u64 },

    /// Bidders in bid order.
    GetBidders { auction_id: u64 },

    GetBid { auction_id: u64, bidder: Address },

    GetOutcome { auction_id: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionQueryResponse {
    Auction(Option<AuctionConfig>),
    Phase(Option<AuctionPhase>),
    AuctionList(Vec<AuctionConfig>),
    Bidders(Vec<Address>),
    Bid(Option<Bid>),
    Outcome(Option<AuctionOutcome>),
}

/// Handle a query.
pub fn handle_query(state: &AuctionState, query: AuctionQuery) -> AuctionQueryResponse {
    match query {
        AuctionQuery::GetAuction { auction_id } => {
            AuctionQueryResponse::Auction(state.get_auction(auction_id).cloned())
        }

        AuctionQuery::GetPhase {
            auction_id,
            timestamp,
        } => AuctionQueryResponse::Phase(state.phase_of(auction_id, timestamp)),

        AuctionQuery::ListActive { timestamp } => AuctionQueryResponse::AuctionList(
            state.active_auctions(timestamp).into_iter().cloned().collect(),
        ),

        AuctionQuery::GetBidders { auction_id } => {
            AuctionQueryResponse::Bidders(state.bidders(auction_id).to_vec())
        }

        AuctionQuery::GetBid { auction_id, bidder } => {
            AuctionQueryResponse::Bid(state.bids.get(&(auction_id, bidder)).cloned())
        }

        AuctionQuery::GetOutcome { auction_id } => {
            AuctionQueryResponse::Outcome(state.results.get(&auction_id).cloned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AuctionParams;

    fn config(auction_id: u64, phase: AuctionPhase) -> AuctionConfig {
        AuctionConfig {
            auction_id,
            seller: [1u8; 32],
            token_id: auction_id,
            start_time: 100,
            end_time: 200,
            settlement_deadline: 300,
            reserve_price: None,
            phase,
            cancel_reason: None,
            pending: None,
        }
    }

    #[test]
    fn test_list_active_skips_terminal() {
        let mut state = AuctionState::new([0u8; 32], AuctionParams::default());
        state.auctions.insert(1, config(1, AuctionPhase::Created));
        state.auctions.insert(2, config(2, AuctionPhase::Settled));
        state.auctions.insert(3, config(3, AuctionPhase::Settling));

        match handle_query(&state, AuctionQuery::ListActive { timestamp: 150 }) {
            AuctionQueryResponse::AuctionList(list) => {
                let ids: Vec<u64> = list.iter().map(|a| a.auction_id).collect();
                assert_eq!(ids, vec![1, 3]);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        assert_eq!(
            handle_query(&state, AuctionQuery::GetPhase { auction_id: 1, timestamp: 250 }),
            AuctionQueryResponse::Phase(Some(AuctionPhase::Closed))
        );
        assert_eq!(
            handle_query(&state, AuctionQuery::GetOutcome { auction_id: 1 }),
            AuctionQueryResponse::Outcome(None)
        );
    }
}
