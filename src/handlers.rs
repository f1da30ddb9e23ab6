//! HTTP adapter. Thin by design: parse, delegate to the command or query
//! layer, render. No bidding rules live here.

// region:    --- Imports
use crate::bidding::commands::{
    handle_exclude_bidder, handle_place_bid, ExcludeBidderCommand, PlaceBidCommand,
};
use crate::database::DatabaseManager;
use crate::notification::{NotificationEvent, NotificationKind, NotificationSink};
use crate::store::postgres::{PgReputationProvider, PostgresBidStore};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;
use tracing::{info, warn};

// endregion: --- Imports

pub type AppState = (Arc<DatabaseManager>, Arc<dyn NotificationSink>);

// region:    --- Command Handlers

/// POST /bid
pub async fn handle_bid(
    State((db_manager, _)): State<AppState>,
    Json(cmd): Json<PlaceBidCommand>,
) -> impl IntoResponse {
    info!("{:<12} --> bid request: {:?}", "Handler", cmd);

    let store = PostgresBidStore::new(db_manager.get_pool());
    let reputation = PgReputationProvider::new(db_manager.get_pool());

    match handle_place_bid(cmd, &store, &reputation).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /exclusion
pub async fn handle_exclusion(
    State((db_manager, notifier)): State<AppState>,
    Json(cmd): Json<ExcludeBidderCommand>,
) -> impl IntoResponse {
    info!("{:<12} --> exclusion request: {:?}", "Handler", cmd);

    let store = PostgresBidStore::new(db_manager.get_pool());
    let bidder_id = cmd.bidder_id;

    match handle_exclude_bidder(cmd, &store).await {
        Ok(receipt) => {
            // Post-commit, fire-and-forget.
            if let Err(e) = notifier
                .notify(NotificationEvent::new(
                    NotificationKind::BidderExcluded,
                    Some(receipt.auction_id),
                    vec![bidder_id],
                ))
                .await
            {
                warn!("{:<12} --> notification send failed: {}", "Handler", e);
            }
            (StatusCode::OK, Json(receipt)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// GET /auction/:id
pub async fn handle_get_auction(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    match crate::query::handlers::get_auction_state(&db_manager, auction_id).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "auction not found", "code": "AUCTION_NOT_FOUND"})),
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /auction/:id/bids
pub async fn handle_get_bids(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    match crate::query::handlers::get_bid_history(&db_manager, auction_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// GET /auction/:id/exclusions
pub async fn handle_get_exclusions(
    State((db_manager, _)): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    match crate::query::handlers::get_exclusions(&db_manager, auction_id).await {
        Ok(bidders) => Json(bidders).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// endregion: --- Query Handlers
