//! Second-price winner determination over encrypted bids.
//!
//! A single pass over the bids in sequence order keeps the highest bid, the
//! second-highest bid and the index of the highest bidder, all encrypted:
//!
//! ```text
//! higher  = highest < bid
//! second  = higher ? highest : (second < bid ? bid : second)
//! highest = higher ? bid : highest
//! winner  = higher ? i : winner
//! ```
//!
//! Strict `<` keeps the earliest bid on ties, and a tie at the top pushes
//! the tied amount into `second`, so the winner pays it. Bids under the
//! reserve count as zero and zero never wins, so the winner index stays
//! [`NO_WINNER`] when nothing qualifies.

use sealed_fhe::{FheContext, FheError};
use sealed_types::{EncryptedValue, FheType, NO_WINNER};

/// Encrypted outcome of the reduction.
#[derive(Clone, Copy, Debug)]
pub struct EncryptedSettlement {
    /// Position of the winner in the bid order, or `NO_WINNER`
    pub winner_index: EncryptedValue,
    /// `max(second highest, reserve)`
    pub clearing_price: EncryptedValue,
}

pub fn compute_second_price(
    fx: &mut FheContext<'_>,
    bids: &[EncryptedValue],
    reserve_price: Option<u64>,
) -> Result<EncryptedSettlement, FheError> {
    let zero = fx.zero(FheType::U64)?;
    let reserve = fx.trivial(reserve_price.unwrap_or(0), FheType::U64)?;

    let mut highest = zero;
    let mut second = zero;
    let mut winner = fx.trivial(NO_WINNER, FheType::U64)?;

    for (i, bid) in bids.iter().enumerate() {
        let qualifies = fx.le(&reserve, bid)?;
        let bid = fx.select(&qualifies, bid, &zero)?;

        let higher = fx.lt(&highest, &bid)?;
        let above_second = fx.lt(&second, &bid)?;
        let runner_up = fx.select(&above_second, &bid, &second)?;

        second = fx.select(&higher, &highest, &runner_up)?;
        highest = fx.select(&higher, &bid, &highest)?;

        let index = fx.trivial(i as u64, FheType::U64)?;
        winner = fx.select(&higher, &index, &winner)?;
    }

    let clearing_price = fx.max(&second, &reserve)?;
    Ok(EncryptedSettlement {
        winner_index: winner,
        clearing_price,
    })
}
