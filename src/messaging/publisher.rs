//! Fire-and-forget event publisher

use crate::messaging::connection::{ConnectionHealth, ConnectionSnapshot, ConnectionStateMachine};
use crate::messaging::events::{DeliveryReceipt, EventPayload, OutboundRecord};
use crate::messaging::metrics::PIPELINE_METRICS;
use crate::messaging::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::messaging::traits::EventProducer;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Why an event did not reach the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No broker connection at publish time
    NotConnected,
    /// Event could not be encoded
    Serialization(String),
    /// Broker refused or failed the send
    Rejected(String),
}

impl DropReason {
    fn label(&self) -> &'static str {
        match self {
            DropReason::NotConnected => "not_connected",
            DropReason::Serialization(_) => "serialization",
            DropReason::Rejected(_) => "rejected",
        }
    }
}

/// Result of one publish attempt. Callers log it and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published(DeliveryReceipt),
    Dropped(DropReason),
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, PublishOutcome::Published(_))
    }
}

/// Publisher counters and connection state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStatus {
    pub connection: ConnectionSnapshot,
    pub backend: &'static str,
    pub topic: String,
    pub source: String,
    pub events_published: u64,
    pub events_dropped: u64,
}

/// Publishes domain events for one service without ever failing its caller.
///
/// Events published while the broker is unreachable are dropped with a
/// warning; there is no buffering.
pub struct EventPublisher {
    producer: Arc<dyn EventProducer>,
    connection: ConnectionStateMachine,
    connection_lost: Notify,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    source: String,
    environment: String,
    topic: String,
    published: AtomicU64,
    dropped: AtomicU64,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl EventPublisher {
    /// `source` is the identity stamped on every event
    pub fn new(
        producer: Arc<dyn EventProducer>,
        source: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            producer,
            connection: ConnectionStateMachine::new("publisher"),
            connection_lost: Notify::new(),
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            source: source.into(),
            environment: "development".to_string(),
            topic: topic.into(),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            supervisor: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Environment tag sent in the `env` message header
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn health(&self) -> ConnectionHealth {
        self.connection.health()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Spawn the connection supervisor. It connects, retrying on a fixed
    /// delay, and reconnects whenever a send reports the connection gone.
    pub fn start(self: &Arc<Self>) {
        let publisher = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                publisher.connect_until_ready().await;
                publisher.connection_lost.notified().await;
            }
        });

        if let Some(previous) = self.supervisor.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Attempt to connect until it succeeds. Returns immediately when a
    /// connection is already up.
    pub async fn connect_until_ready(&self) {
        loop {
            if let Err(e) = self.connection.begin_connect() {
                tracing::debug!(error = %e, "Publisher connect skipped");
                return;
            }

            match self.producer.connect().await {
                Ok(()) => {
                    if self.connection.mark_connected().is_ok() {
                        tracing::info!(
                            backend = self.producer.backend(),
                            topic = %self.topic,
                            "Publisher connected to broker"
                        );
                    }
                    return;
                }
                Err(e) => {
                    let _ = self.connection.mark_connect_failed(&e.to_string());
                    tracing::warn!(
                        backend = self.producer.backend(),
                        error = %e,
                        retry_in_ms = self.retry.delay.as_millis() as u64,
                        "Publisher could not reach broker, retrying"
                    );
                    self.sleeper.sleep(self.retry.delay).await;
                }
            }
        }
    }

    /// Publish one event. Never fails; the outcome is logged and returned.
    pub async fn publish(
        &self,
        action: &str,
        item_id: Option<&str>,
        extra: Map<String, Value>,
    ) -> PublishOutcome {
        if !self.connection.state().is_connected() {
            tracing::warn!(
                action = action,
                item_id = item_id.unwrap_or("-"),
                "Broker not connected, dropping event"
            );
            return self.drop_event(DropReason::NotConnected);
        }

        let payload = EventPayload::new(&self.source, action, item_id.map(str::to_string))
            .with_extra(extra);

        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(action = action, error = %e, "Failed to encode event");
                return self.drop_event(DropReason::Serialization(e.to_string()));
            }
        };

        let record = OutboundRecord {
            topic: self.topic.clone(),
            key: payload.routing_key().to_string(),
            payload: bytes,
            headers: vec![
                ("source".to_string(), self.source.clone()),
                ("env".to_string(), self.environment.clone()),
            ],
        };

        match self.producer.send(record).await {
            Ok(receipt) => {
                tracing::info!(
                    topic = %receipt.topic,
                    action = action,
                    partition = receipt.partition,
                    offset = receipt.offset,
                    "Event published"
                );
                self.published.fetch_add(1, Ordering::Relaxed);
                PIPELINE_METRICS
                    .events_published
                    .with_label_values(&[&self.topic])
                    .inc();
                PublishOutcome::Published(receipt)
            }
            Err(e) => {
                tracing::error!(
                    topic = %self.topic,
                    action = action,
                    error = %e,
                    "Failed to publish event"
                );
                if e.is_connection_loss() && self.connection.mark_connection_lost(&e.to_string()).is_ok() {
                    self.connection_lost.notify_one();
                }
                self.drop_event(DropReason::Rejected(e.to_string()))
            }
        }
    }

    /// Publish on a background task. The handle may be dropped; tests await it.
    pub fn publish_detached(
        self: &Arc<Self>,
        action: impl Into<String>,
        item_id: Option<String>,
        extra: Map<String, Value>,
    ) -> JoinHandle<PublishOutcome> {
        let publisher = Arc::clone(self);
        let action = action.into();
        tokio::spawn(async move { publisher.publish(&action, item_id.as_deref(), extra).await })
    }

    /// Stop reconnecting and disconnect, giving up after `timeout`
    pub async fn shutdown(&self, timeout: Duration) {
        let supervisor = self.supervisor.lock().take();
        if let Some(handle) = supervisor {
            handle.abort();
        }
        self.connection.mark_disconnected();

        match tokio::time::timeout(timeout, self.producer.disconnect()).await {
            Ok(Ok(())) => tracing::info!("Publisher disconnected from broker"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Publisher disconnect failed"),
            Err(_) => tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Publisher disconnect timed out"
            ),
        }
    }

    pub fn status(&self) -> PublisherStatus {
        PublisherStatus {
            connection: self.connection.health().snapshot(),
            backend: self.producer.backend(),
            topic: self.topic.clone(),
            source: self.source.clone(),
            events_published: self.published.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn drop_event(&self, reason: DropReason) -> PublishOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        PIPELINE_METRICS
            .publish_drops
            .with_label_values(&[&self.topic, reason.label()])
            .inc();
        PublishOutcome::Dropped(reason)
    }
}
