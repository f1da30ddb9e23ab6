// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Auction

/// Lifecycle state of an auction. `Sold`, `Expired` and `Removed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuctionStatus {
    Open,
    Sold,
    Expired,
    Removed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Open => "OPEN",
            AuctionStatus::Sold => "SOLD",
            AuctionStatus::Expired => "EXPIRED",
            AuctionStatus::Removed => "REMOVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(AuctionStatus::Open),
            "SOLD" => Some(AuctionStatus::Sold),
            "EXPIRED" => Some(AuctionStatus::Expired),
            "REMOVED" => Some(AuctionStatus::Removed),
            _ => None,
        }
    }
}

/// Mutable projection of one auction: the cached clearing price, leader and
/// bid count, plus the immutable listing parameters the engine needs.
///
/// `current_price` and `leading_bidder_id` are a cache over the non-excluded
/// bid set; every mutation goes through a version-checked commit so the cache
/// can never drift from what the pricing rules would derive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction_id: i64,
    pub seller_id: i64,
    pub start_price: i64,
    pub step_price: i64,
    pub buy_now_price: Option<i64>,
    pub current_price: i64,
    pub leading_bidder_id: Option<i64>,
    pub bid_count: i64,
    pub status: AuctionStatus,
    pub end_time: DateTime<Utc>,
    pub review_needed: bool,
    pub allow_unrated_bidder: bool,
    /// Optimistic concurrency counter; bumped by every aggregate write.
    pub version: i64,
}

impl AuctionSnapshot {
    /// Capability check: is `user_id` the seller of this auction?
    pub fn is_seller_of(&self, user_id: i64) -> bool {
        self.seller_id == user_id
    }

    /// Minimum amount an incoming bid must carry to be admitted.
    pub fn min_acceptable_bid(&self) -> i64 {
        if self.bid_count == 0 {
            self.start_price
        } else {
            self.current_price + self.step_price
        }
    }
}

// endregion: --- Auction

// region:    --- Bid

/// One row of the append-only bid ledger. Never mutated, never deleted;
/// exclusion removes a bidder's influence, not their rows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub submitted_at: DateTime<Utc>,
}

impl Bid {
    /// Ranking key: highest amount first, earliest submission breaks ties,
    /// ledger id as the final disambiguator.
    pub fn ranking_key(&self) -> (i64, DateTime<Utc>, i64) {
        (-self.amount, self.submitted_at, self.id)
    }
}

// endregion: --- Bid

// region:    --- Reputation

/// Review counts for one bidder, fetched from the review subsystem.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Reputation {
    pub positive_count: i64,
    pub negative_count: i64,
}

impl Reputation {
    pub fn total(&self) -> i64 {
        self.positive_count + self.negative_count
    }

    /// Share of positive reviews; only meaningful when `total() > 0`.
    pub fn positive_ratio(&self) -> f64 {
        self.positive_count as f64 / self.total() as f64
    }
}

// endregion: --- Reputation

// region:    --- Seller Grant

/// Time-boxed (or permanent, `expires_at = None`) authorization to list
/// auctions. Deleted by the expirer once consumed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SellerGrant {
    pub user_id: i64,
    pub is_approved: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub requested_at: DateTime<Utc>,
}

// endregion: --- Seller Grant
