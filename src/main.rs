// region:    --- Imports
use axum::{
    routing::{get, post},
    Router,
};
use bidding_engine::database::DatabaseManager;
use bidding_engine::handlers;
use bidding_engine::notification::{KafkaNotifier, LogNotifier, NotificationSink};
use bidding_engine::scheduler::{AuctionCloser, SellerPermissionExpirer};
use bidding_engine::store::postgres::{PostgresBidStore, PostgresGrantStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let db_manager = Arc::new(DatabaseManager::new().await?);

    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> database initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> database initialized", "Main");

    // Kafka is optional at runtime; without a broker, notifications are
    // logged only.
    let notifier: Arc<dyn NotificationSink> = match std::env::var("KAFKA_BROKERS") {
        Ok(brokers) => {
            let notifier = KafkaNotifier::new(&brokers)?;
            notifier.create_topic(5, 1).await?;
            info!("{:<12} --> Kafka notifier ready: {}", "Main", brokers);
            Arc::new(notifier)
        }
        Err(_) => {
            warn!(
                "{:<12} --> KAFKA_BROKERS not set, notifications are log-only",
                "Main"
            );
            Arc::new(LogNotifier)
        }
    };

    // Background sweeps: auction closing and seller grant expiry.
    let bid_store = Arc::new(PostgresBidStore::new(db_manager.get_pool()));
    let grant_store = Arc::new(PostgresGrantStore::new(db_manager.get_pool()));
    AuctionCloser::new(Arc::clone(&bid_store), Arc::clone(&notifier)).start();
    SellerPermissionExpirer::new(grant_store, Arc::clone(&notifier)).start();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes_all = Router::new()
        .route("/bid", post(handlers::handle_bid))
        .route("/exclusion", post(handlers::handle_exclusion))
        .route("/auction/:id", get(handlers::handle_get_auction))
        .route("/auction/:id/bids", get(handlers::handle_get_bids))
        .route(
            "/auction/:id/exclusions",
            get(handlers::handle_get_exclusions),
        )
        .layer(cors)
        .with_state((db_manager, notifier));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
