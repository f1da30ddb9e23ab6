// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Store Error

/// Fault in the persistence layer, surfaced to callers as a generic
/// `PERSISTENCE_FAILURE`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Decode(String),
}

// endregion: --- Store Error

// region:    --- Bid Error

/// Everything that can go wrong between a bid (or exclusion) request and its
/// commit. Admission failures are computed before any mutation and returned
/// directly; `ConcurrentConflict` is only surfaced after internal retries
/// are exhausted.
#[derive(Debug, Error)]
pub enum BidError {
    #[error("auction not found")]
    AuctionNotFound,

    #[error("auction is not open for bidding")]
    AuctionClosed,

    #[error("bid amount is below the minimum of {minimum}")]
    BidTooLow { minimum: i64 },

    #[error("unrated bidders are not allowed on this auction")]
    UnratedNotAllowed,

    #[error("bidder reputation is below the required threshold")]
    LowReputation,

    #[error("bidder is excluded from this auction")]
    Excluded,

    #[error("the seller cannot bid on their own auction")]
    OwnAuction,

    #[error("only the seller of the auction may request an exclusion")]
    NotSeller,

    #[error("too many concurrent updates, giving up after retries")]
    ConcurrentConflict,

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl BidError {
    /// Stable machine-readable code, independent of the display message.
    pub fn code(&self) -> &'static str {
        match self {
            BidError::AuctionNotFound => "AUCTION_NOT_FOUND",
            BidError::AuctionClosed => "AUCTION_CLOSED",
            BidError::BidTooLow { .. } => "BID_TOO_LOW",
            BidError::UnratedNotAllowed => "UNRATED_NOT_ALLOWED",
            BidError::LowReputation => "LOW_REPUTATION",
            BidError::Excluded => "EXCLUDED",
            BidError::OwnAuction => "OWN_AUCTION",
            BidError::NotSeller => "NOT_SELLER",
            BidError::ConcurrentConflict => "CONCURRENT_CONFLICT",
            BidError::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            BidError::AuctionNotFound => StatusCode::NOT_FOUND,
            BidError::ConcurrentConflict => StatusCode::CONFLICT,
            BidError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BidError::NotSeller | BidError::OwnAuction => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for BidError {
    fn into_response(self) -> Response {
        let body = match &self {
            BidError::BidTooLow { minimum } => serde_json::json!({
                "error": self.to_string(),
                "code": self.code(),
                "minimum": minimum,
            }),
            _ => serde_json::json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

// endregion: --- Bid Error
