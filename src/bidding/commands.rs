//! Bid admission and bidder exclusion, each wrapped in the optimistic
//! read-compute-write cycle.
//!
//! A cycle reads the aggregate snapshot (carrying its version), evaluates the
//! guards and the price engine against that read, and commits conditionally
//! on the version being unchanged. Losing a race costs one retry against the
//! fresh state; exhausting the retry budget surfaces `CONCURRENT_CONFLICT`.
//! Different auctions never contend with each other.

// region:    --- Imports
use crate::bidding::admission::check_admission;
use crate::bidding::model::AuctionStatus;
use crate::bidding::pricing;
use crate::error::BidError;
use crate::store::{BidStore, CommitOutcome, NewBid, ReputationProvider};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// endregion: --- Imports

// Retry budget for version conflicts before giving up.
const MAX_RETRIES: i32 = 100;

// region:    --- Commands

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExcludeBidderCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    /// Seller requesting the ban; `None` for the administrative path.
    pub requested_by: Option<i64>,
}

// endregion: --- Commands

// region:    --- Receipts

/// What the caller learns after a successful bid.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BidReceipt {
    pub auction_id: i64,
    pub current_price: i64,
    pub leading_bidder_id: Option<i64>,
    /// Whether the caller now holds the lead.
    pub leading: bool,
    /// Whether the bid met the buy-now price and closed the auction.
    pub sold: bool,
}

/// Recomputed aggregate state after an exclusion.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExclusionReceipt {
    pub auction_id: i64,
    pub current_price: i64,
    pub leading_bidder_id: Option<i64>,
    pub bid_count: i64,
}

// endregion: --- Receipts

// region:    --- Place Bid

/// Admits one bid: guard checks, price computation, conditional commit.
pub async fn handle_place_bid(
    cmd: PlaceBidCommand,
    store: &impl BidStore,
    reputation: &impl ReputationProvider,
) -> Result<BidReceipt, BidError> {
    info!("{:<12} --> placing bid: {:?}", "Command", cmd);

    // Review counts do not change mid-flight; one lookup serves all retries.
    let bidder_reputation = reputation.reputation(cmd.bidder_id).await?;

    let mut retries = 0;
    while retries < MAX_RETRIES {
        let auction = store
            .load_auction(cmd.auction_id)
            .await?
            .ok_or(BidError::AuctionNotFound)?;

        let excluded = store.is_excluded(cmd.auction_id, cmd.bidder_id).await?;
        let now = Utc::now();

        check_admission(
            &auction,
            bidder_reputation,
            excluded,
            cmd.bidder_id,
            cmd.amount,
            now,
        )?;

        let top = store.top_bids(cmd.auction_id, None, 1).await?;
        let update = pricing::apply_bid(&auction, top.first(), cmd.bidder_id, cmd.amount);

        // A buy-now bid is recorded in the ledger at the buy-now price, the
        // amount the sale actually happened at.
        let recorded_amount = if update.sold {
            update.current_price
        } else {
            cmd.amount
        };

        let outcome = store
            .commit_bid(
                cmd.auction_id,
                auction.version,
                &update,
                auction.bid_count + 1,
                NewBid {
                    auction_id: cmd.auction_id,
                    bidder_id: cmd.bidder_id,
                    amount: recorded_amount,
                    submitted_at: now,
                },
            )
            .await?;

        match outcome {
            CommitOutcome::Committed => {
                info!(
                    "{:<12} --> bid committed: auction={} price={} leader={:?}",
                    "Command", cmd.auction_id, update.current_price, update.leading_bidder_id
                );
                return Ok(BidReceipt {
                    auction_id: cmd.auction_id,
                    current_price: update.current_price,
                    leading_bidder_id: update.leading_bidder_id,
                    leading: update.leading_bidder_id == Some(cmd.bidder_id),
                    sold: update.sold,
                });
            }
            CommitOutcome::Conflict => {
                warn!(
                    "{:<12} --> version conflict on auction {}, retrying",
                    "Command", cmd.auction_id
                );
                retries += 1;
            }
        }
    }

    Err(BidError::ConcurrentConflict)
}

// endregion: --- Place Bid

// region:    --- Exclude Bidder

/// Retroactively excludes a bidder and re-derives the aggregate from the two
/// highest surviving bids, all under the same version check bids use.
pub async fn handle_exclude_bidder(
    cmd: ExcludeBidderCommand,
    store: &impl BidStore,
) -> Result<ExclusionReceipt, BidError> {
    info!("{:<12} --> excluding bidder: {:?}", "Command", cmd);

    let mut retries = 0;
    while retries < MAX_RETRIES {
        let auction = store
            .load_auction(cmd.auction_id)
            .await?
            .ok_or(BidError::AuctionNotFound)?;

        if let Some(requested_by) = cmd.requested_by {
            if !auction.is_seller_of(requested_by) {
                return Err(BidError::NotSeller);
            }
        }

        if auction.status != AuctionStatus::Open {
            return Err(BidError::AuctionClosed);
        }

        let survivors = store
            .top_bids(cmd.auction_id, Some(cmd.bidder_id), 2)
            .await?;
        let remaining = store.count_bids(cmd.auction_id, Some(cmd.bidder_id)).await?;
        let update = pricing::rederive(&auction, &survivors);

        let outcome = store
            .commit_exclusion(
                cmd.auction_id,
                cmd.bidder_id,
                auction.version,
                &update,
                remaining,
            )
            .await?;

        match outcome {
            CommitOutcome::Committed => {
                info!(
                    "{:<12} --> exclusion committed: auction={} bidder={} price={} leader={:?}",
                    "Command",
                    cmd.auction_id,
                    cmd.bidder_id,
                    update.current_price,
                    update.leading_bidder_id
                );
                return Ok(ExclusionReceipt {
                    auction_id: cmd.auction_id,
                    current_price: update.current_price,
                    leading_bidder_id: update.leading_bidder_id,
                    bid_count: remaining,
                });
            }
            CommitOutcome::Conflict => {
                warn!(
                    "{:<12} --> version conflict on auction {}, retrying",
                    "Command", cmd.auction_id
                );
                retries += 1;
            }
        }
    }

    Err(BidError::ConcurrentConflict)
}

// endregion: --- Exclude Bidder
