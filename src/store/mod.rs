//! Storage seams for the bidding engine.
//!
//! The command layer and the sweepers only ever talk to these traits; the
//! Postgres implementation carries production traffic and the in-memory one
//! backs the engine tests.

// region:    --- Imports
use crate::bidding::model::{AuctionSnapshot, Bid, SellerGrant};
use crate::bidding::pricing::PriceUpdate;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// endregion: --- Imports

pub mod memory;
pub mod postgres;

// region:    --- Write Types

/// A bid row about to be appended to the ledger.
#[derive(Debug, Clone)]
pub struct NewBid {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Result of a version-checked commit. `Conflict` means another writer got
/// in first and the caller must re-read and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Conflict,
}

/// An auction transitioned by a closer sweep, with the parties to notify.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ClosedAuction {
    pub auction_id: i64,
    pub seller_id: i64,
    pub leading_bidder_id: Option<i64>,
}

// endregion: --- Write Types

// region:    --- BidStore

/// Aggregate, ledger and exclusion access for one auction at a time.
///
/// Commits are conditional on the aggregate `version` read with the
/// snapshot; each successful commit bumps the version by one, which is what
/// makes the read-compute-write cycle safe under races.
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn load_auction(&self, auction_id: i64) -> Result<Option<AuctionSnapshot>, StoreError>;

    /// The highest-ranked non-excluded bids, best first. `without_bidder`
    /// additionally masks one bidder, used when re-deriving for a pending
    /// exclusion.
    async fn top_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Bid>, StoreError>;

    /// Count of non-excluded bids, with the same optional mask.
    async fn count_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
    ) -> Result<i64, StoreError>;

    async fn is_excluded(&self, auction_id: i64, bidder_id: i64) -> Result<bool, StoreError>;

    /// Atomically applies the aggregate update and appends the bid row,
    /// provided the aggregate version still equals `expected_version`.
    async fn commit_bid(
        &self,
        auction_id: i64,
        expected_version: i64,
        update: &PriceUpdate,
        new_bid_count: i64,
        bid: NewBid,
    ) -> Result<CommitOutcome, StoreError>;

    /// Atomically records the exclusion and applies the re-derived aggregate
    /// state under the same version check.
    async fn commit_exclusion(
        &self,
        auction_id: i64,
        bidder_id: i64,
        expected_version: i64,
        update: &PriceUpdate,
        new_bid_count: i64,
    ) -> Result<CommitOutcome, StoreError>;

    /// Conditional sweep: every open auction past its end time with a leader
    /// becomes `SOLD`. Returns the rows transitioned by this call only.
    async fn close_sold(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError>;

    /// Conditional sweep: every open auction past its end time without a
    /// leader becomes `EXPIRED`. Returns the rows transitioned by this call.
    async fn close_expired(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError>;
}

// endregion: --- BidStore

// region:    --- GrantStore

/// Seller-grant rows plus the delegated role mutation on the user record.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Approved grants whose expiry has passed.
    async fn expired_grants(&self, now: DateTime<Utc>) -> Result<Vec<SellerGrant>, StoreError>;

    /// Downgrades the user's role away from seller, only if it still is
    /// seller. Returns whether a row changed.
    async fn demote_seller(&self, user_id: i64) -> Result<bool, StoreError>;

    /// Deletes the grant, guarded by the same expiry predicate so a rerun
    /// matches nothing. Returns whether a row was deleted.
    async fn delete_expired_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

// endregion: --- GrantStore

// region:    --- ReputationProvider

/// External collaborator handing the engine a bidder's review counts.
#[async_trait]
pub trait ReputationProvider: Send + Sync {
    async fn reputation(
        &self,
        bidder_id: i64,
    ) -> Result<crate::bidding::model::Reputation, StoreError>;
}

// endregion: --- ReputationProvider
