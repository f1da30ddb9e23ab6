//! Timer-driven sweeps over shared state.
//!
//! Both sweepers are predicate-guarded conditional updates: a row already
//! transitioned never matches again, so overlapping ticks (or a second
//! process instance) converge to the same state. Each tick body takes `now`
//! explicitly; tests call `run_once` with a fabricated clock and never sleep.

// region:    --- Imports
use crate::notification::{NotificationEvent, NotificationKind, NotificationSink};
use crate::store::{BidStore, GrantStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

/// How often expired auctions are closed out.
pub const CLOSER_INTERVAL: Duration = Duration::from_secs(60);
/// How often expired seller grants are reaped.
pub const EXPIRER_INTERVAL: Duration = Duration::from_secs(3600);

// region:    --- Auction Closer

/// Transitions expired auctions to their terminal state: `SOLD` when a
/// leader exists, `EXPIRED` otherwise.
pub struct AuctionCloser<S, N: ?Sized> {
    store: Arc<S>,
    notifier: Arc<N>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CloserTick {
    pub sold: usize,
    pub expired: usize,
}

impl<S, N> AuctionCloser<S, N>
where
    S: BidStore + 'static,
    N: NotificationSink + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Spawns the periodic sweep.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let closer = AuctionCloser { store, notifier };
            let mut interval = interval(CLOSER_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = closer.run_once(Utc::now()).await {
                    // Leave it for the next tick; the predicate guarantees
                    // nothing was half-applied.
                    error!("{:<12} --> auction close sweep failed: {:?}", "Closer", e);
                }
            }
        });
    }

    /// One sweep. Notifications go out after the transitions have committed;
    /// a failed send is logged and dropped.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CloserTick, crate::error::StoreError> {
        let sold = self.store.close_sold(now).await?;
        let expired = self.store.close_expired(now).await?;

        for auction in &sold {
            let mut recipients = vec![auction.seller_id];
            recipients.extend(auction.leading_bidder_id);
            self.dispatch(NotificationEvent::new(
                NotificationKind::AuctionSold,
                Some(auction.auction_id),
                recipients,
            ))
            .await;
        }
        for auction in &expired {
            self.dispatch(NotificationEvent::new(
                NotificationKind::AuctionExpired,
                Some(auction.auction_id),
                vec![auction.seller_id],
            ))
            .await;
        }

        if !sold.is_empty() || !expired.is_empty() {
            info!(
                "{:<12} --> closed auctions: {} sold, {} expired",
                "Closer",
                sold.len(),
                expired.len()
            );
        } else {
            debug!("{:<12} --> nothing to close", "Closer");
        }

        Ok(CloserTick {
            sold: sold.len(),
            expired: expired.len(),
        })
    }

    async fn dispatch(&self, event: NotificationEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!("{:<12} --> notification send failed: {}", "Closer", e);
        }
    }
}

// endregion: --- Auction Closer

// region:    --- Seller Permission Expirer

/// Reaps approved, time-boxed seller grants whose expiry has passed:
/// demotes the user (only if their role still says seller) and deletes the
/// grant row under the same expiry predicate.
pub struct SellerPermissionExpirer<G, N: ?Sized> {
    store: Arc<G>,
    notifier: Arc<N>,
}

impl<G, N> SellerPermissionExpirer<G, N>
where
    G: GrantStore + 'static,
    N: NotificationSink + ?Sized + 'static,
{
    pub fn new(store: Arc<G>, notifier: Arc<N>) -> Self {
        Self { store, notifier }
    }

    /// Spawns the periodic sweep.
    pub fn start(&self) {
        let store = Arc::clone(&self.store);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            let expirer = SellerPermissionExpirer { store, notifier };
            let mut interval = interval(EXPIRER_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = expirer.run_once(Utc::now()).await {
                    error!("{:<12} --> grant expiry sweep failed: {:?}", "Expirer", e);
                }
            }
        });
    }

    /// One sweep; returns how many grants were reaped.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, crate::error::StoreError> {
        let grants = self.store.expired_grants(now).await?;
        let mut reaped = 0;

        for grant in grants {
            // Demotion is conditional on the role still reflecting the
            // grant, so a role changed by another path is left alone.
            let demoted = self.store.demote_seller(grant.user_id).await?;
            let deleted = self.store.delete_expired_grant(grant.user_id, now).await?;

            if deleted {
                reaped += 1;
                info!(
                    "{:<12} --> seller grant expired: user={} demoted={}",
                    "Expirer", grant.user_id, demoted
                );
                if let Err(e) = self
                    .notifier
                    .notify(NotificationEvent::new(
                        NotificationKind::SellerGrantExpired,
                        None,
                        vec![grant.user_id],
                    ))
                    .await
                {
                    warn!("{:<12} --> notification send failed: {}", "Expirer", e);
                }
            }
        }

        Ok(reaped)
    }
}

// endregion: --- Seller Permission Expirer
