//! Eligibility checks gating whether a bid may reach the price engine.
//! Purely evaluative: no side effects, computed before any mutation.

// region:    --- Imports
use crate::bidding::model::{AuctionSnapshot, AuctionStatus, Reputation};
use crate::error::BidError;
use chrono::{DateTime, Utc};

// endregion: --- Imports

/// Positive-review share a bidder must hold on review-gated auctions.
pub const REPUTATION_THRESHOLD: f64 = 0.80;

/// Admits or rejects a bid against one auction snapshot.
///
/// Check order is fixed: ownership, lifecycle, bidder standing, exclusion,
/// then amount. The first failing check is returned.
pub fn check_admission(
    auction: &AuctionSnapshot,
    reputation: Reputation,
    excluded: bool,
    bidder_id: i64,
    amount: i64,
    now: DateTime<Utc>,
) -> Result<(), BidError> {
    if auction.is_seller_of(bidder_id) {
        return Err(BidError::OwnAuction);
    }

    if auction.status != AuctionStatus::Open || now >= auction.end_time {
        return Err(BidError::AuctionClosed);
    }

    if reputation.total() == 0 {
        if !auction.allow_unrated_bidder {
            return Err(BidError::UnratedNotAllowed);
        }
    } else if auction.review_needed && reputation.positive_ratio() < REPUTATION_THRESHOLD {
        return Err(BidError::LowReputation);
    }

    if excluded {
        return Err(BidError::Excluded);
    }

    let minimum = auction.min_acceptable_bid();
    if amount < minimum {
        return Err(BidError::BidTooLow { minimum });
    }

    Ok(())
}

// endregion: --- Tests
