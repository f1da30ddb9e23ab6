//! Engine tests against the in-memory store: full bid flow, exclusion
//! re-derivation, concurrent admission, and both background sweeps.

use async_trait::async_trait;
use bidding_engine::bidding::commands::{
    handle_exclude_bidder, handle_place_bid, ExcludeBidderCommand, PlaceBidCommand,
};
use bidding_engine::bidding::model::{AuctionSnapshot, AuctionStatus, Reputation, SellerGrant};
use bidding_engine::error::BidError;
use bidding_engine::notification::{NotificationEvent, NotificationKind, NotificationSink};
use bidding_engine::scheduler::{AuctionCloser, SellerPermissionExpirer};
use bidding_engine::store::memory::MemoryStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

// region:    --- Helpers

const SELLER: i64 = 900;

fn open_auction(auction_id: i64, start_price: i64, step_price: i64) -> AuctionSnapshot {
    AuctionSnapshot {
        auction_id,
        seller_id: SELLER,
        start_price,
        step_price,
        buy_now_price: None,
        current_price: start_price,
        leading_bidder_id: None,
        bid_count: 0,
        status: AuctionStatus::Open,
        end_time: Utc::now() + Duration::hours(2),
        review_needed: false,
        allow_unrated_bidder: true,
        version: 0,
    }
}

fn store_with_auction(auction: AuctionSnapshot) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert_auction(auction);
    store
}

fn bid(auction_id: i64, bidder_id: i64, amount: i64) -> PlaceBidCommand {
    PlaceBidCommand {
        auction_id,
        bidder_id,
        amount,
    }
}

fn exclude(auction_id: i64, bidder_id: i64) -> ExcludeBidderCommand {
    ExcludeBidderCommand {
        auction_id,
        bidder_id,
        requested_by: None,
    }
}

fn grant(user_id: i64, expires_at: Option<DateTime<Utc>>, approved: bool) -> SellerGrant {
    SellerGrant {
        user_id,
        is_approved: approved,
        expires_at,
        requested_at: Utc::now() - Duration::days(30),
    }
}

/// Sink that records everything it is asked to send.
#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, event: NotificationEvent) -> Result<(), String> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// endregion: --- Helpers

// region:    --- Bid Flow

// start=100, step=10: X 150 -> X leads at 100; Y 130 -> X holds at 130;
// Y 200 -> Y leads at 160.
#[tokio::test]
async fn proxy_bidding_sequence_end_to_end() {
    let store = store_with_auction(open_auction(1, 100, 10));

    let r1 = handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();
    assert_eq!(r1.current_price, 100);
    assert_eq!(r1.leading_bidder_id, Some(1));
    assert!(r1.leading);

    let r2 = handle_place_bid(bid(1, 2, 130), &*store, &*store).await.unwrap();
    assert_eq!(r2.current_price, 130);
    assert_eq!(r2.leading_bidder_id, Some(1));
    assert!(!r2.leading);

    let r3 = handle_place_bid(bid(1, 2, 200), &*store, &*store).await.unwrap();
    assert_eq!(r3.current_price, 160);
    assert_eq!(r3.leading_bidder_id, Some(2));
    assert!(r3.leading);

    let snapshot = store.snapshot(1).unwrap();
    assert_eq!(snapshot.bid_count, 3);
    assert_eq!(snapshot.current_price, 160);
    assert_eq!(snapshot.leading_bidder_id, Some(2));
    assert_eq!(store.ledger(1).len(), 3);
}

#[tokio::test]
async fn first_bid_below_start_price_is_rejected() {
    let store = store_with_auction(open_auction(1, 100, 10));
    let err = handle_place_bid(bid(1, 1, 90), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::BidTooLow { minimum: 100 }));
    assert_eq!(store.ledger(1).len(), 0, "rejected bid must not be logged");
}

#[tokio::test]
async fn bid_on_unknown_auction_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let err = handle_place_bid(bid(77, 1, 100), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::AuctionNotFound));
}

#[tokio::test]
async fn expired_auction_rejects_bids() {
    let mut auction = open_auction(1, 100, 10);
    auction.end_time = Utc::now() - Duration::seconds(1);
    let store = store_with_auction(auction);

    let err = handle_place_bid(bid(1, 1, 150), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::AuctionClosed));
}

#[tokio::test]
async fn review_gated_auction_enforces_reputation() {
    let mut auction = open_auction(1, 100, 10);
    auction.review_needed = true;
    auction.allow_unrated_bidder = false;
    let store = store_with_auction(auction);

    // No reviews at all.
    let err = handle_place_bid(bid(1, 1, 150), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::UnratedNotAllowed));

    // Rated but below the 0.80 bar.
    store.set_reputation(
        2,
        Reputation {
            positive_count: 3,
            negative_count: 2,
        },
    );
    let err = handle_place_bid(bid(1, 2, 150), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::LowReputation));

    // Rated and above the bar.
    store.set_reputation(
        3,
        Reputation {
            positive_count: 9,
            negative_count: 1,
        },
    );
    assert!(handle_place_bid(bid(1, 3, 150), &*store, &*store).await.is_ok());
}

#[tokio::test]
async fn seller_cannot_bid_on_own_auction() {
    let store = store_with_auction(open_auction(1, 100, 10));
    let err = handle_place_bid(bid(1, SELLER, 150), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::OwnAuction));
}

#[tokio::test]
async fn buy_now_bid_closes_the_auction_immediately() {
    let mut auction = open_auction(1, 100, 10);
    auction.buy_now_price = Some(500);
    let store = store_with_auction(auction);

    handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();
    let receipt = handle_place_bid(bid(1, 2, 600), &*store, &*store)
        .await
        .unwrap();
    assert!(receipt.sold);
    assert_eq!(receipt.current_price, 500);
    assert_eq!(receipt.leading_bidder_id, Some(2));

    let snapshot = store.snapshot(1).unwrap();
    assert_eq!(snapshot.status, AuctionStatus::Sold);
    // The sale is logged at the buy-now price, not the submitted ceiling.
    assert_eq!(store.ledger(1).last().unwrap().amount, 500);

    let err = handle_place_bid(bid(1, 3, 700), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::AuctionClosed));
}

// endregion: --- Bid Flow

// region:    --- Exclusion

// X's ceiling is 150, Y's is 130. Banning X leaves Y as sole bidder and the
// price resets to start_price, not to Y's ceiling.
#[tokio::test]
async fn excluding_the_leader_resets_price_for_a_sole_survivor() {
    let store = store_with_auction(open_auction(1, 100, 10));
    handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();
    handle_place_bid(bid(1, 2, 130), &*store, &*store).await.unwrap();

    let receipt = handle_exclude_bidder(exclude(1, 1), &*store).await.unwrap();
    assert_eq!(receipt.current_price, 100);
    assert_eq!(receipt.leading_bidder_id, Some(2));
    assert_eq!(receipt.bid_count, 1);

    // Bid rows survive the ban; only their influence is gone.
    assert_eq!(store.ledger(1).len(), 2);

    let err = handle_place_bid(bid(1, 1, 500), &*store, &*store)
        .await
        .unwrap_err();
    assert!(matches!(err, BidError::Excluded));
}

#[tokio::test]
async fn excluding_a_loser_rederives_from_remaining_top_two() {
    let store = store_with_auction(open_auction(1, 100, 10));
    handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();
    handle_place_bid(bid(1, 2, 130), &*store, &*store).await.unwrap();
    handle_place_bid(bid(1, 3, 200), &*store, &*store).await.unwrap();

    // Survivors: 200 (bidder 3) and 130 (bidder 2) -> min(200, 140) = 140.
    let receipt = handle_exclude_bidder(exclude(1, 1), &*store).await.unwrap();
    assert_eq!(receipt.leading_bidder_id, Some(3));
    assert_eq!(receipt.current_price, 140);
    assert_eq!(receipt.bid_count, 2);
}

#[tokio::test]
async fn excluding_everyone_clears_the_leader() {
    let store = store_with_auction(open_auction(1, 100, 10));
    handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();

    let receipt = handle_exclude_bidder(exclude(1, 1), &*store).await.unwrap();
    assert_eq!(receipt.leading_bidder_id, None);
    assert_eq!(receipt.current_price, 100);
    assert_eq!(receipt.bid_count, 0);
}

#[tokio::test]
async fn exclusion_requires_the_seller_when_a_requester_is_given() {
    let store = store_with_auction(open_auction(1, 100, 10));
    handle_place_bid(bid(1, 1, 150), &*store, &*store).await.unwrap();

    let mut cmd = exclude(1, 1);
    cmd.requested_by = Some(123);
    let err = handle_exclude_bidder(cmd, &*store).await.unwrap_err();
    assert!(matches!(err, BidError::NotSeller));

    let mut cmd = exclude(1, 1);
    cmd.requested_by = Some(SELLER);
    assert!(handle_exclude_bidder(cmd, &*store).await.is_ok());
}

// endregion: --- Exclusion

// region:    --- Concurrency

// Two racers read the same pre-state; exactly one commits first and the
// other recomputes against the fresh state instead of overwriting it.
#[tokio::test]
async fn concurrent_bids_never_clobber_each_other() {
    let store = store_with_auction(open_auction(1, 100, 10));

    let s1 = Arc::clone(&store);
    let s2 = Arc::clone(&store);
    let t1 = tokio::spawn(async move { handle_place_bid(bid(1, 1, 200), &*s1, &*s1).await });
    let t2 = tokio::spawn(async move { handle_place_bid(bid(1, 2, 210), &*s2, &*s2).await });

    t1.await.unwrap().unwrap();
    t2.await.unwrap().unwrap();

    let snapshot = store.snapshot(1).unwrap();
    assert_eq!(snapshot.bid_count, 2);
    assert_eq!(snapshot.leading_bidder_id, Some(2), "highest ceiling leads");
    // The clearing price depends on arrival order (200 then 210 gives 210;
    // 210 then 200 gives 200) but never exceeds either ceiling.
    assert!(snapshot.current_price == 200 || snapshot.current_price == 210);
    assert_eq!(snapshot.version, 2, "every commit bumps the version once");
}

#[tokio::test]
async fn many_concurrent_bidders_converge_to_the_highest_ceiling() {
    let store = store_with_auction(open_auction(1, 100, 10));

    let mut handles = Vec::new();
    for i in 1..=30i64 {
        let store = Arc::clone(&store);
        let amount = 100 + i * 10;
        handles.push(tokio::spawn(async move {
            handle_place_bid(bid(1, i, amount), &*store, &*store).await
        }));
    }

    let mut admitted: i64 = 0;
    let mut too_low: i64 = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            // A racer can legitimately find the price has moved past its
            // amount by the time it re-reads.
            Err(BidError::BidTooLow { .. }) => too_low += 1,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert_eq!(admitted + too_low, 30);
    assert!(admitted >= 1);

    let snapshot = store.snapshot(1).unwrap();
    // The top ceiling (400) always clears admission, so bidder 30 must lead.
    assert_eq!(snapshot.leading_bidder_id, Some(30));
    assert!(snapshot.current_price <= 400);
    assert_eq!(snapshot.bid_count, admitted);
    assert_eq!(store.ledger(1).len() as i64, admitted);
}

// endregion: --- Concurrency

// region:    --- Auction Closer

#[tokio::test]
async fn closer_transitions_expired_auctions_and_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();

    // Past end time with a leader -> SOLD.
    let mut with_leader = open_auction(1, 100, 10);
    with_leader.end_time = now - Duration::minutes(5);
    with_leader.leading_bidder_id = Some(7);
    with_leader.bid_count = 3;
    store.insert_auction(with_leader);

    // Past end time without a leader -> EXPIRED.
    let mut without_leader = open_auction(2, 100, 10);
    without_leader.end_time = now - Duration::minutes(5);
    store.insert_auction(without_leader);

    // Still running -> untouched.
    store.insert_auction(open_auction(3, 100, 10));

    let sink = Arc::new(RecordingSink::default());
    let closer = AuctionCloser::new(Arc::clone(&store), Arc::clone(&sink));

    let tick = closer.run_once(now).await.unwrap();
    assert_eq!((tick.sold, tick.expired), (1, 1));
    assert_eq!(store.snapshot(1).unwrap().status, AuctionStatus::Sold);
    assert_eq!(store.snapshot(2).unwrap().status, AuctionStatus::Expired);
    assert_eq!(store.snapshot(3).unwrap().status, AuctionStatus::Open);

    let events = sink.events();
    assert_eq!(events.len(), 2);
    let sold = events
        .iter()
        .find(|e| e.kind == NotificationKind::AuctionSold)
        .unwrap();
    assert_eq!(sold.auction_id, Some(1));
    assert_eq!(sold.recipient_ids, vec![SELLER, 7]);
    let expired = events
        .iter()
        .find(|e| e.kind == NotificationKind::AuctionExpired)
        .unwrap();
    assert_eq!(expired.recipient_ids, vec![SELLER]);

    // Second sweep over the same state: nothing matches, nothing is sent.
    let tick = closer.run_once(now).await.unwrap();
    assert_eq!((tick.sold, tick.expired), (0, 0));
    assert_eq!(sink.events().len(), 2);
}

#[tokio::test]
async fn notification_failure_does_not_undo_the_transition() {
    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(&self, _event: NotificationEvent) -> Result<(), String> {
            Err("broker unreachable".to_string())
        }
    }

    let store = Arc::new(MemoryStore::new());
    let mut auction = open_auction(1, 100, 10);
    auction.end_time = Utc::now() - Duration::minutes(1);
    auction.leading_bidder_id = Some(7);
    store.insert_auction(auction);

    let closer = AuctionCloser::new(Arc::clone(&store), Arc::new(FailingSink));
    let tick = closer.run_once(Utc::now()).await.unwrap();
    assert_eq!(tick.sold, 1);
    assert_eq!(store.snapshot(1).unwrap().status, AuctionStatus::Sold);
}

// endregion: --- Auction Closer

// region:    --- Grant Expirer

#[tokio::test]
async fn expirer_reaps_expired_grants_and_leaves_the_rest() {
    let store = Arc::new(MemoryStore::new());
    let now = Utc::now();

    // Approved, expired, role still SELLER -> demoted and reaped.
    store.insert_grant(grant(1, Some(now - Duration::hours(1)), true), "SELLER");
    // Approved, permanent -> untouched.
    store.insert_grant(grant(2, None, true), "SELLER");
    // Expired but never approved -> untouched.
    store.insert_grant(grant(3, Some(now - Duration::hours(1)), false), "USER");
    // Approved, expired, but role already changed by another path -> grant
    // reaped without clobbering the role.
    store.insert_grant(grant(4, Some(now - Duration::hours(1)), true), "ADMIN");

    let sink = Arc::new(RecordingSink::default());
    let expirer = SellerPermissionExpirer::new(Arc::clone(&store), Arc::clone(&sink));

    let reaped = expirer.run_once(now).await.unwrap();
    assert_eq!(reaped, 2);

    assert_eq!(store.role_of(1).unwrap(), "USER");
    assert!(!store.has_grant(1));
    assert_eq!(store.role_of(2).unwrap(), "SELLER");
    assert!(store.has_grant(2));
    assert!(store.has_grant(3));
    assert_eq!(store.role_of(4).unwrap(), "ADMIN");
    assert!(!store.has_grant(4));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.kind == NotificationKind::SellerGrantExpired));

    // Rerun: the deleted grants cannot be reprocessed.
    let reaped = expirer.run_once(now).await.unwrap();
    assert_eq!(reaped, 0);
    assert_eq!(sink.events().len(), 2);
}

// endregion: --- Grant Expirer
