//! Proxy-bid price computation.
//!
//! A submitted amount is the bidder's private ceiling; the public clearing
//! price is derived second-price style from the two strongest ceilings and
//! never reveals the leader's own maximum. All functions here are pure —
//! they read snapshots and bids and return the next aggregate state, which
//! the command layer commits under a version check.

// region:    --- Imports
use crate::bidding::model::{AuctionSnapshot, Bid};

// endregion: --- Imports

// region:    --- Outcome

/// Next cached aggregate state produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    pub current_price: i64,
    pub leading_bidder_id: Option<i64>,
    /// True only when a bid met the buy-now price and the auction closes
    /// immediately.
    pub sold: bool,
}

// endregion: --- Outcome

// region:    --- Incremental Bid

/// Applies one admitted bid against the current leading bid.
///
/// `leading` is the highest non-excluded bid on record (ties broken by
/// earliest submission), or `None` when the ledger is effectively empty.
pub fn apply_bid(
    auction: &AuctionSnapshot,
    leading: Option<&Bid>,
    bidder_id: i64,
    amount: i64,
) -> PriceUpdate {
    // A ceiling at or above buy-now closes the auction on the spot, at the
    // buy-now price rather than the bid amount.
    if let Some(buy_now) = auction.buy_now_price {
        if amount >= buy_now {
            return PriceUpdate {
                current_price: buy_now,
                leading_bidder_id: Some(bidder_id),
                sold: true,
            };
        }
    }

    let leader = match leading {
        // First effective bid: the bidder leads at the floor, their ceiling
        // stays private.
        None => {
            return PriceUpdate {
                current_price: auction.start_price,
                leading_bidder_id: Some(bidder_id),
                sold: false,
            }
        }
        Some(leader) => leader,
    };

    if leader.bidder_id == bidder_id {
        // The leader raising (or restating) their own ceiling moves nothing
        // publicly.
        return PriceUpdate {
            current_price: auction.current_price,
            leading_bidder_id: Some(bidder_id),
            sold: false,
        };
    }

    if amount > leader.amount {
        // Challenger overtakes: price climbs to one step over the old
        // ceiling, capped by the new ceiling itself.
        PriceUpdate {
            current_price: (leader.amount + auction.step_price).min(amount),
            leading_bidder_id: Some(bidder_id),
            sold: false,
        }
    } else if amount == leader.amount {
        // Exact tie: the earlier bid wins, nothing moves.
        PriceUpdate {
            current_price: auction.current_price,
            leading_bidder_id: Some(leader.bidder_id),
            sold: false,
        }
    } else {
        // Challenger falls short: the leader holds, but the losing ceiling
        // pushes the public price up to itself.
        PriceUpdate {
            current_price: amount.max(auction.current_price),
            leading_bidder_id: Some(leader.bidder_id),
            sold: false,
        }
    }
}

// endregion: --- Incremental Bid

// region:    --- Re-derivation

/// Recomputes leader and price from scratch after an exclusion.
///
/// `top_bids` are the two highest remaining non-excluded bids in ranking
/// order. With a single remaining bid the price resets to `start_price`
/// rather than to that bid's own level; this mirrors the long-standing
/// production behavior and is kept intentionally.
pub fn rederive(auction: &AuctionSnapshot, top_bids: &[Bid]) -> PriceUpdate {
    match top_bids {
        [] => PriceUpdate {
            current_price: auction.start_price,
            leading_bidder_id: None,
            sold: false,
        },
        [only] => PriceUpdate {
            current_price: auction.start_price,
            leading_bidder_id: Some(only.bidder_id),
            sold: false,
        },
        [top, second, ..] => PriceUpdate {
            current_price: top.amount.min(second.amount + auction.step_price),
            leading_bidder_id: Some(top.bidder_id),
            sold: false,
        },
    }
}

// endregion: --- Re-derivation

// endregion: --- Tests
