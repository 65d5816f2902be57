//! Call message types for the auction engine.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use sealed_types::ExternalInput;

/// Call messages for the auction engine.
///
/// Winner revelation is not a call: it is delivered by the runtime from a
/// fulfilled gateway request.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum AuctionCall {
    /// Escrow `token_id` and open an auction for it.
    CreateAuction {
        token_id: u64,
        start_time: u64,
        end_time: u64,
        settlement_deadline: u64,
        reserve_price: Option<u64>,
    },

    /// Submit (or replace) an encrypted bid. The input must be encrypted to
    /// the auction contract.
    Bid { auction_id: u64, amount: ExternalInput },

    /// Compute the winner under encryption and request its decryption.
    Settle { auction_id: u64 },

    /// Seller aborts before bidding closes.
    Cancel { auction_id: u64 },
}
