//! sqlx/Postgres implementation of the store traits.
//!
//! Optimistic concurrency: every aggregate write is `UPDATE … WHERE id = $n
//! AND version = $m AND status = 'OPEN'` and bumps `version`; zero rows
//! affected means another writer (or the closer) got in first and the commit
//! reports a conflict instead of touching anything.

// region:    --- Imports
use crate::bidding::model::{AuctionSnapshot, AuctionStatus, Bid, Reputation, SellerGrant};
use crate::bidding::pricing::PriceUpdate;
use crate::error::StoreError;
use crate::store::{BidStore, ClosedAuction, CommitOutcome, GrantStore, NewBid, ReputationProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use std::sync::Arc;

// endregion: --- Imports

// region:    --- Queries

const LOAD_AUCTION: &str = r#"
    SELECT id AS auction_id, seller_id, start_price, step_price, buy_now_price,
           current_price, leading_bidder_id, bid_count, status, end_time,
           review_needed, allow_unrated_bidder, version
    FROM auctions
    WHERE id = $1
"#;

const TOP_BIDS: &str = r#"
    SELECT b.id, b.auction_id, b.bidder_id, b.amount, b.submitted_at
    FROM bids b
    WHERE b.auction_id = $1
      AND ($2::bigint IS NULL OR b.bidder_id <> $2)
      AND NOT EXISTS (
          SELECT 1 FROM auction_exclusions e
          WHERE e.auction_id = b.auction_id AND e.bidder_id = b.bidder_id
      )
    ORDER BY b.amount DESC, b.submitted_at ASC, b.id ASC
    LIMIT $3
"#;

const COUNT_BIDS: &str = r#"
    SELECT COUNT(*) AS n
    FROM bids b
    WHERE b.auction_id = $1
      AND ($2::bigint IS NULL OR b.bidder_id <> $2)
      AND NOT EXISTS (
          SELECT 1 FROM auction_exclusions e
          WHERE e.auction_id = b.auction_id AND e.bidder_id = b.bidder_id
      )
"#;

const IS_EXCLUDED: &str = r#"
    SELECT EXISTS(
        SELECT 1 FROM auction_exclusions WHERE auction_id = $1 AND bidder_id = $2
    ) AS excluded
"#;

const UPDATE_AGGREGATE: &str = r#"
    UPDATE auctions
    SET current_price = $2, leading_bidder_id = $3, bid_count = $4,
        status = $5, version = version + 1
    WHERE id = $1 AND version = $6 AND status = 'OPEN'
"#;

const INSERT_BID: &str = r#"
    INSERT INTO bids (auction_id, bidder_id, amount, submitted_at)
    VALUES ($1, $2, $3, $4)
"#;

const INSERT_EXCLUSION: &str = r#"
    INSERT INTO auction_exclusions (auction_id, bidder_id)
    VALUES ($1, $2)
    ON CONFLICT (auction_id, bidder_id) DO NOTHING
"#;

const CLOSE_SOLD: &str = r#"
    UPDATE auctions
    SET status = 'SOLD', version = version + 1
    WHERE status = 'OPEN' AND end_time <= $1 AND leading_bidder_id IS NOT NULL
    RETURNING id AS auction_id, seller_id, leading_bidder_id
"#;

const CLOSE_EXPIRED: &str = r#"
    UPDATE auctions
    SET status = 'EXPIRED', version = version + 1
    WHERE status = 'OPEN' AND end_time <= $1 AND leading_bidder_id IS NULL
    RETURNING id AS auction_id, seller_id, leading_bidder_id
"#;

const EXPIRED_GRANTS: &str = r#"
    SELECT user_id, is_approved, expires_at, requested_at
    FROM seller_grants
    WHERE is_approved = TRUE AND expires_at IS NOT NULL AND expires_at <= $1
"#;

const DEMOTE_SELLER: &str = r#"
    UPDATE users SET role = 'USER' WHERE id = $1 AND role = 'SELLER'
"#;

const DELETE_EXPIRED_GRANT: &str = r#"
    DELETE FROM seller_grants
    WHERE user_id = $1 AND is_approved = TRUE
      AND expires_at IS NOT NULL AND expires_at <= $2
"#;

const GET_REPUTATION: &str = r#"
    SELECT positive_count, negative_count FROM user_reputation WHERE user_id = $1
"#;

// endregion: --- Queries

// region:    --- Row Types

#[derive(FromRow)]
struct AuctionRow {
    auction_id: i64,
    seller_id: i64,
    start_price: i64,
    step_price: i64,
    buy_now_price: Option<i64>,
    current_price: i64,
    leading_bidder_id: Option<i64>,
    bid_count: i64,
    status: String,
    end_time: DateTime<Utc>,
    review_needed: bool,
    allow_unrated_bidder: bool,
    version: i64,
}

impl TryFrom<AuctionRow> for AuctionSnapshot {
    type Error = StoreError;

    fn try_from(row: AuctionRow) -> Result<Self, StoreError> {
        let status = AuctionStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Decode(format!("unknown auction status {}", row.status)))?;
        Ok(AuctionSnapshot {
            auction_id: row.auction_id,
            seller_id: row.seller_id,
            start_price: row.start_price,
            step_price: row.step_price,
            buy_now_price: row.buy_now_price,
            current_price: row.current_price,
            leading_bidder_id: row.leading_bidder_id,
            bid_count: row.bid_count,
            status,
            end_time: row.end_time,
            review_needed: row.review_needed,
            allow_unrated_bidder: row.allow_unrated_bidder,
            version: row.version,
        })
    }
}

// endregion: --- Row Types

// region:    --- PostgresBidStore

pub struct PostgresBidStore {
    pool: Arc<PgPool>,
}

impl PostgresBidStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BidStore for PostgresBidStore {
    async fn load_auction(&self, auction_id: i64) -> Result<Option<AuctionSnapshot>, StoreError> {
        let row = sqlx::query_as::<_, AuctionRow>(LOAD_AUCTION)
            .bind(auction_id)
            .fetch_optional(&*self.pool)
            .await?;
        row.map(AuctionSnapshot::try_from).transpose()
    }

    async fn top_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Bid>, StoreError> {
        let bids = sqlx::query_as::<_, Bid>(TOP_BIDS)
            .bind(auction_id)
            .bind(without_bidder)
            .bind(limit)
            .fetch_all(&*self.pool)
            .await?;
        Ok(bids)
    }

    async fn count_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(COUNT_BIDS)
            .bind(auction_id)
            .bind(without_bidder)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("n"))
    }

    async fn is_excluded(&self, auction_id: i64, bidder_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query(IS_EXCLUDED)
            .bind(auction_id)
            .bind(bidder_id)
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("excluded"))
    }

    async fn commit_bid(
        &self,
        auction_id: i64,
        expected_version: i64,
        update: &PriceUpdate,
        new_bid_count: i64,
        bid: NewBid,
    ) -> Result<CommitOutcome, StoreError> {
        let status = if update.sold {
            AuctionStatus::Sold
        } else {
            AuctionStatus::Open
        };

        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query(UPDATE_AGGREGATE)
            .bind(auction_id)
            .bind(update.current_price)
            .bind(update.leading_bidder_id)
            .bind(new_bid_count)
            .bind(status.as_str())
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if changed == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::Conflict);
        }

        sqlx::query(INSERT_BID)
            .bind(bid.auction_id)
            .bind(bid.bidder_id)
            .bind(bid.amount)
            .bind(bid.submitted_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn commit_exclusion(
        &self,
        auction_id: i64,
        bidder_id: i64,
        expected_version: i64,
        update: &PriceUpdate,
        new_bid_count: i64,
    ) -> Result<CommitOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let changed = sqlx::query(UPDATE_AGGREGATE)
            .bind(auction_id)
            .bind(update.current_price)
            .bind(update.leading_bidder_id)
            .bind(new_bid_count)
            .bind(AuctionStatus::Open.as_str())
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if changed == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::Conflict);
        }

        sqlx::query(INSERT_EXCLUSION)
            .bind(auction_id)
            .bind(bidder_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn close_sold(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError> {
        let rows = sqlx::query_as::<_, ClosedAuction>(CLOSE_SOLD)
            .bind(now)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }

    async fn close_expired(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError> {
        let rows = sqlx::query_as::<_, ClosedAuction>(CLOSE_EXPIRED)
            .bind(now)
            .fetch_all(&*self.pool)
            .await?;
        Ok(rows)
    }
}

// endregion: --- PostgresBidStore

// region:    --- PostgresGrantStore

pub struct PostgresGrantStore {
    pool: Arc<PgPool>,
}

impl PostgresGrantStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantStore for PostgresGrantStore {
    async fn expired_grants(&self, now: DateTime<Utc>) -> Result<Vec<SellerGrant>, StoreError> {
        let grants = sqlx::query_as::<_, SellerGrant>(EXPIRED_GRANTS)
            .bind(now)
            .fetch_all(&*self.pool)
            .await?;
        Ok(grants)
    }

    async fn demote_seller(&self, user_id: i64) -> Result<bool, StoreError> {
        let changed = sqlx::query(DEMOTE_SELLER)
            .bind(user_id)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(changed > 0)
    }

    async fn delete_expired_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let deleted = sqlx::query(DELETE_EXPIRED_GRANT)
            .bind(user_id)
            .bind(now)
            .execute(&*self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}

// endregion: --- PostgresGrantStore

// region:    --- PgReputationProvider

/// Reads the review summary maintained by the review subsystem.
pub struct PgReputationProvider {
    pool: Arc<PgPool>,
}

impl PgReputationProvider {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReputationProvider for PgReputationProvider {
    async fn reputation(&self, bidder_id: i64) -> Result<Reputation, StoreError> {
        let row = sqlx::query(GET_REPUTATION)
            .bind(bidder_id)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(match row {
            Some(row) => Reputation {
                positive_count: row.get("positive_count"),
                negative_count: row.get("negative_count"),
            },
            // No summary row yet means an unrated bidder.
            None => Reputation::default(),
        })
    }
}

// endregion: --- PgReputationProvider
