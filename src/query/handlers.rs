// region:    --- Imports
use super::queries;
use crate::bidding::model::Bid;
use crate::database::DatabaseManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use sqlx::Row;
use tracing::info;

// endregion: --- Imports

// region:    --- Views

/// Read-model row for the public auction endpoints.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuctionView {
    pub id: i64,
    pub seller_id: i64,
    pub title: String,
    pub start_price: i64,
    pub step_price: i64,
    pub buy_now_price: Option<i64>,
    pub current_price: i64,
    pub leading_bidder_id: Option<i64>,
    pub bid_count: i64,
    pub status: String,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Views

// region:    --- Query Handlers

/// Current public state of one auction.
pub async fn get_auction_state(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<AuctionView>, SqlxError> {
    info!("{:<12} --> auction state: id={}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, AuctionView>(queries::GET_AUCTION_STATE)
                    .bind(auction_id)
                    .fetch_optional(&mut **tx)
                    .await
            })
        })
        .await
}

/// Full bid history, newest first.
pub async fn get_bid_history(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<Bid>, SqlxError> {
    info!("{:<12} --> bid history: id={}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                sqlx::query_as::<_, Bid>(queries::GET_BID_HISTORY)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await
            })
        })
        .await
}

/// Bidders excluded from an auction.
pub async fn get_exclusions(
    db_manager: &DatabaseManager,
    auction_id: i64,
) -> Result<Vec<i64>, SqlxError> {
    info!("{:<12} --> exclusions: id={}", "Query", auction_id);
    db_manager
        .transaction(|tx| {
            Box::pin(async move {
                let rows = sqlx::query(queries::GET_EXCLUSIONS)
                    .bind(auction_id)
                    .fetch_all(&mut **tx)
                    .await?;
                Ok(rows.iter().map(|r| r.get("bidder_id")).collect())
            })
        })
        .await
}

// endregion: --- Query Handlers
