//! Fire-and-forget notification dispatch.
//!
//! Sinks are called after the state transition has committed; a failed send
//! is logged by the caller and never rolls anything back.

// region:    --- Imports
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Event Model

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    AuctionSold,
    AuctionExpired,
    BidderExcluded,
    SellerGrantExpired,
}

/// One outbound notification; `recipient_ids` are resolved by the caller
/// (seller, winning bidder, banned bidder, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub auction_id: Option<i64>,
    pub recipient_ids: Vec<i64>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, auction_id: Option<i64>, recipient_ids: Vec<i64>) -> Self {
        Self {
            kind,
            auction_id,
            recipient_ids,
        }
    }
}

// endregion: --- Event Model

// region:    --- Sink Trait

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: NotificationEvent) -> Result<(), String>;
}

// endregion: --- Sink Trait

// region:    --- Kafka Sink

pub const NOTIFICATIONS_TOPIC: &str = "notifications";

/// Publishes notification events to Kafka for the delivery service (email
/// etc.) to consume.
pub struct KafkaNotifier {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaNotifier {
    pub fn new(brokers: &str) -> Result<Self, String> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| format!("producer creation failed: {e:?}"))?;

        Ok(KafkaNotifier {
            producer,
            brokers: brokers.to_string(),
        })
    }

    /// Ensures the notifications topic exists; called once at startup.
    pub async fn create_topic(
        &self,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), String> {
        info!(
            "{:<12} --> creating Kafka topic: {}",
            "Notifier", NOTIFICATIONS_TOPIC
        );

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| format!("admin client creation failed: {e:?}"))?;

        let new_topic = NewTopic::new(
            NOTIFICATIONS_TOPIC,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| format!("topic creation failed: {e:?}"))?;

        Ok(())
    }
}

#[async_trait]
impl NotificationSink for KafkaNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), String> {
        let key = event
            .auction_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "grant".to_string());
        let payload =
            serde_json::to_string(&event).map_err(|e| format!("serialize failed: {e}"))?;

        debug!(
            "{:<12} --> sending notification: topic={}, key={}",
            "Notifier", NOTIFICATIONS_TOPIC, key
        );

        let record = FutureRecord::to(NOTIFICATIONS_TOPIC)
            .key(&key)
            .payload(&payload);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| format!("error sending notification: {e:?}"))?;

        Ok(())
    }
}

// endregion: --- Kafka Sink

// region:    --- Log Sink

/// Sink that only logs; used when no broker is configured and in tests that
/// don't assert on deliveries.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: NotificationEvent) -> Result<(), String> {
        info!("{:<12} --> notification (log only): {:?}", "Notifier", event);
        Ok(())
    }
}

// endregion: --- Log Sink
