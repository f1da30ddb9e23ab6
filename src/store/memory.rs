//! In-memory implementation of the store traits.
//!
//! Backs the engine tests and mirrors the Postgres semantics exactly: the
//! same version check guards every commit, and the sweeps are conditional on
//! the same predicates. One mutex over the whole state stands in for the
//! per-row transaction; commits re-check the version under the lock.

// region:    --- Imports
use crate::bidding::model::{AuctionSnapshot, AuctionStatus, Bid, Reputation, SellerGrant};
use crate::bidding::pricing::PriceUpdate;
use crate::error::StoreError;
use crate::store::{BidStore, ClosedAuction, CommitOutcome, GrantStore, NewBid, ReputationProvider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

// endregion: --- Imports

// region:    --- State

#[derive(Default)]
struct Inner {
    auctions: HashMap<i64, AuctionSnapshot>,
    bids: Vec<Bid>,
    exclusions: HashSet<(i64, i64)>,
    grants: HashMap<i64, SellerGrant>,
    roles: HashMap<i64, String>,
    reputations: HashMap<i64, Reputation>,
    next_bid_id: i64,
}

impl Inner {
    fn ranked_bids(&self, auction_id: i64, without_bidder: Option<i64>) -> Vec<Bid> {
        let mut bids: Vec<Bid> = self
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .filter(|b| Some(b.bidder_id) != without_bidder)
            .filter(|b| !self.exclusions.contains(&(auction_id, b.bidder_id)))
            .cloned()
            .collect();
        bids.sort_by_key(Bid::ranking_key);
        bids
    }
}

/// Shared fake for engine tests; also usable as a scratch backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an auction row.
    pub fn insert_auction(&self, snapshot: AuctionSnapshot) {
        let mut inner = self.inner.lock().unwrap();
        inner.auctions.insert(snapshot.auction_id, snapshot);
    }

    /// Seeds a review summary for a bidder.
    pub fn set_reputation(&self, bidder_id: i64, reputation: Reputation) {
        let mut inner = self.inner.lock().unwrap();
        inner.reputations.insert(bidder_id, reputation);
    }

    /// Seeds a seller grant together with the user's current role.
    pub fn insert_grant(&self, grant: SellerGrant, role: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.roles.insert(grant.user_id, role.to_string());
        inner.grants.insert(grant.user_id, grant);
    }

    pub fn role_of(&self, user_id: i64) -> Option<String> {
        self.inner.lock().unwrap().roles.get(&user_id).cloned()
    }

    pub fn has_grant(&self, user_id: i64) -> bool {
        self.inner.lock().unwrap().grants.contains_key(&user_id)
    }

    pub fn snapshot(&self, auction_id: i64) -> Option<AuctionSnapshot> {
        self.inner.lock().unwrap().auctions.get(&auction_id).cloned()
    }

    pub fn ledger(&self, auction_id: i64) -> Vec<Bid> {
        self.inner
            .lock()
            .unwrap()
            .bids
            .iter()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect()
    }
}

// endregion: --- State

// region:    --- BidStore Impl

#[async_trait]
impl BidStore for MemoryStore {
    async fn load_auction(&self, auction_id: i64) -> Result<Option<AuctionSnapshot>, StoreError> {
        Ok(self.inner.lock().unwrap().auctions.get(&auction_id).cloned())
    }

    async fn top_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Bid>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut bids = inner.ranked_bids(auction_id, without_bidder);
        bids.truncate(limit as usize);
        Ok(bids)
    }

    async fn count_bids(
        &self,
        auction_id: i64,
        without_bidder: Option<i64>,
    ) -> Result<i64, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.ranked_bids(auction_id, without_bidder).len() as i64)
    }

    async fn is_excluded(&self, auction_id: i64, bidder_id: i64) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.exclusions.contains(&(auction_id, bidder_id)))
    }

    async fn commit_bid(
        &self,
        auction_id: i64,
        expected_version: i64,
        update: &PriceUpdate,
        new_bid_count: i64,
        bid: NewBid,
    ) -> Result<CommitOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let auction = inner
            .auctions
            .get_mut(&auction_id)
            .ok_or_else(|| StoreError::Decode(format!("auction {auction_id} vanished")))?;

        if auction.version != expected_version || auction.status != AuctionStatus::Open {
            return Ok(CommitOutcome::Conflict);
        }

        auction.current_price = update.current_price;
        auction.leading_bidder_id = update.leading_bidder_id;
        auction.bid_count = new_bid_count;
        if update.sold {
            auction.status = AuctionStatus::Sold;
        }
        auction.version += 1;

        inner.next_bid_id += 1;
        let id = inner.next_bid_id;
        inner.bids.push(Bid {
            id,
            auction_id: bid.auction_id,
            bidder_id: bid.bidder_id,
            amount: bid.amount,
            submitted_at: bid.submitted_at,
        });
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
        let mut inner = self.inner.lock().unwrap();
        let auction = inner
            .auctions
            .get_mut(&auction_id)
            .ok_or_else(|| StoreError::Decode(format!("auction {auction_id} vanished")))?;

        if auction.version != expected_version || auction.status != AuctionStatus::Open {
            return Ok(CommitOutcome::Conflict);
        }

        auction.current_price = update.current_price;
        auction.leading_bidder_id = update.leading_bidder_id;
        auction.bid_count = new_bid_count;
        auction.version += 1;

        inner.exclusions.insert((auction_id, bidder_id));
        Ok(CommitOutcome::Committed)
    }

    async fn close_sold(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut closed = Vec::new();
        for auction in inner.auctions.values_mut() {
            if auction.status == AuctionStatus::Open
                && auction.end_time <= now
                && auction.leading_bidder_id.is_some()
            {
                auction.status = AuctionStatus::Sold;
                auction.version += 1;
                closed.push(ClosedAuction {
                    auction_id: auction.auction_id,
                    seller_id: auction.seller_id,
                    leading_bidder_id: auction.leading_bidder_id,
                });
            }
        }
        Ok(closed)
    }

    async fn close_expired(&self, now: DateTime<Utc>) -> Result<Vec<ClosedAuction>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut closed = Vec::new();
        for auction in inner.auctions.values_mut() {
            if auction.status == AuctionStatus::Open
                && auction.end_time <= now
                && auction.leading_bidder_id.is_none()
            {
                auction.status = AuctionStatus::Expired;
                auction.version += 1;
                closed.push(ClosedAuction {
                    auction_id: auction.auction_id,
                    seller_id: auction.seller_id,
                    leading_bidder_id: None,
                });
            }
        }
        Ok(closed)
    }
}

// endregion: --- BidStore Impl

// region:    --- GrantStore Impl

#[async_trait]
impl GrantStore for MemoryStore {
    async fn expired_grants(&self, now: DateTime<Utc>) -> Result<Vec<SellerGrant>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .grants
            .values()
            .filter(|g| g.is_approved && g.expires_at.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }

    async fn demote_seller(&self, user_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.roles.get_mut(&user_id) {
            Some(role) if role == "SELLER" => {
                *role = "USER".to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_expired_grant(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let expired = inner
            .grants
            .get(&user_id)
            .is_some_and(|g| g.is_approved && g.expires_at.is_some_and(|at| at <= now));
        if expired {
            inner.grants.remove(&user_id);
        }
        Ok(expired)
    }
}

// endregion: --- GrantStore Impl

// region:    --- ReputationProvider Impl

#[async_trait]
impl ReputationProvider for MemoryStore {
    async fn reputation(&self, bidder_id: i64) -> Result<Reputation, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.reputations.get(&bidder_id).copied().unwrap_or_default())
    }
}

// endregion: --- ReputationProvider Impl
