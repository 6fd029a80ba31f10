//! Consumer-group subscriber feeding the event log

use crate::error::Result;
use crate::messaging::connection::{ConnectionHealth, ConnectionSnapshot, ConnectionStateMachine};
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::events::{EventPayload, InboundMessage, IngestedEvent, StoredEvent};
use crate::messaging::metrics::PIPELINE_METRICS;
use crate::messaging::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::messaging::traits::{EventSubscriber, MessageStream};
use crate::state::EventStore;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Consumer counters and connection state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatus {
    pub connection: ConnectionSnapshot,
    pub backend: &'static str,
    pub topic: String,
    pub group_id: String,
    pub messages_consumed: u64,
    pub messages_skipped: u64,
    pub events_stored: usize,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Ingests events from a topic into an [`EventStore`].
///
/// Messages are handled one at a time in delivery order. The subscribe loop
/// never gives up: any failure is logged and the whole connect + subscribe
/// sequence is retried after the fixed delay. Only [`EventConsumer::shutdown`]
/// ends it.
pub struct EventConsumer {
    subscriber: Arc<dyn EventSubscriber>,
    store: Arc<dyn EventStore>,
    connection: ConnectionStateMachine,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    topic: String,
    group_id: String,
    messages_consumed: AtomicU64,
    messages_skipped: AtomicU64,
    last_message_at: RwLock<Option<DateTime<Utc>>>,
    stopping: AtomicBool,
    stop: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventConsumer {
    pub fn new(
        subscriber: Arc<dyn EventSubscriber>,
        store: Arc<dyn EventStore>,
        topic: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            subscriber,
            store,
            connection: ConnectionStateMachine::new("consumer"),
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            topic: topic.into(),
            group_id: group_id.into(),
            messages_consumed: AtomicU64::new(0),
            messages_skipped: AtomicU64::new(0),
            last_message_at: RwLock::new(None),
            stopping: AtomicBool::new(false),
            stop: Notify::new(),
            task: Mutex::new(None),
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

    pub fn health(&self) -> ConnectionHealth {
        self.connection.health()
    }

    pub fn messages_consumed(&self) -> u64 {
        self.messages_consumed.load(Ordering::Relaxed)
    }

    pub fn messages_skipped(&self) -> u64 {
        self.messages_skipped.load(Ordering::Relaxed)
    }

    /// Spawn the subscribe loop on the runtime
    pub fn start(self: &Arc<Self>) {
        self.stopping.store(false, Ordering::SeqCst);
        let consumer = Arc::clone(self);
        let handle = tokio::spawn(async move { consumer.run().await });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the subscribe loop and close the subscription, giving up after
    /// `timeout`. The loop is aborted if it has not finished by then.
    pub async fn shutdown(&self, timeout: Duration) {
        self.stopping.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();

        let task = self.task.lock().take();
        if let Some(mut handle) = task {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                tracing::warn!(
                    topic = %self.topic,
                    timeout_ms = timeout.as_millis() as u64,
                    "Consumer close timed out"
                );
                handle.abort();
            }
        }

        if self.connection.mark_disconnected() {
            tracing::info!(topic = %self.topic, "Consumer stopped");
        }
    }

    async fn stopped(&self) {
        loop {
            // Registered before the flag check so a concurrent shutdown is not missed
            let notified = self.stop.notified();
            if self.stopping.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    /// Subscribe loop. Returns once [`EventConsumer::shutdown`] is called.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(
            backend = self.subscriber.backend(),
            topic = %self.topic,
            group_id = %self.group_id,
            "Starting consumer"
        );

        loop {
            let subscribed = tokio::select! {
                _ = self.stopped() => return,
                subscribed = self.connect_and_subscribe() => subscribed,
            };

            match subscribed {
                Ok(mut stream) => {
                    if self.consume(stream.as_mut()).await {
                        if let Err(e) = stream.close().await {
                            tracing::warn!(topic = %self.topic, error = %e, "Consumer close failed");
                        }
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        topic = %self.topic,
                        error = %e,
                        retry_in_ms = self.retry.delay.as_millis() as u64,
                        "Consumer could not subscribe, retrying"
                    );
                }
            }

            tokio::select! {
                _ = self.stopped() => return,
                _ = self.sleeper.sleep(self.retry.delay) => {}
            }
        }
    }

    async fn connect_and_subscribe(&self) -> MessagingResult<Box<dyn MessageStream>> {
        self.connection.begin_connect()?;

        match self.subscriber.subscribe(&self.topic).await {
            Ok(stream) => {
                self.connection.mark_connected()?;
                tracing::info!(
                    topic = %self.topic,
                    group_id = %self.group_id,
                    "Consumer subscribed"
                );
                Ok(stream)
            }
            Err(e) => {
                let _ = self.connection.mark_connect_failed(&e.to_string());
                Err(e)
            }
        }
    }

    /// Hand messages to the store until the connection breaks (`false`) or
    /// shutdown is requested (`true`)
    async fn consume(&self, stream: &mut dyn MessageStream) -> bool {
        loop {
            let next = tokio::select! {
                _ = self.stopped() => return true,
                next = stream.next() => next,
            };

            match next {
                Ok(Some(message)) => {
                    self.handle_message(message).await;
                }
                Ok(None) => {
                    tracing::warn!(topic = %self.topic, "Subscription ended");
                    let _ = self.connection.mark_connection_lost("subscription ended");
                    return false;
                }
                Err(e) => {
                    tracing::error!(topic = %self.topic, error = %e, "Consumer lost broker connection");
                    let _ = self.connection.mark_connection_lost(&e.to_string());
                    return false;
                }
            }
        }
    }

    /// Ingest one delivered message. Malformed payloads are logged and skipped.
    pub async fn handle_message(&self, message: InboundMessage) -> Option<StoredEvent> {
        let parsed = match message.payload.as_deref() {
            Some(bytes) => EventPayload::parse(bytes),
            None => Err(MessagingError::InvalidMessage("empty payload".to_string())),
        };

        let payload = match parsed {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Skipping malformed message"
                );
                self.messages_skipped.fetch_add(1, Ordering::Relaxed);
                PIPELINE_METRICS
                    .messages_skipped
                    .with_label_values(&[&message.topic])
                    .inc();
                return None;
            }
        };

        match self.store.append(IngestedEvent::from_broker(payload, &message)).await {
            Ok(stored) => {
                self.messages_consumed.fetch_add(1, Ordering::Relaxed);
                *self.last_message_at.write() = Some(stored.received_at);
                PIPELINE_METRICS
                    .messages_consumed
                    .with_label_values(&[&message.topic])
                    .inc();
                tracing::debug!(
                    event_id = %stored.id,
                    source = %stored.source,
                    action = %stored.action,
                    offset = message.offset,
                    "Event ingested"
                );
                Some(stored)
            }
            Err(e) => {
                tracing::error!(offset = message.offset, error = %e, "Failed to store event");
                None
            }
        }
    }

    pub async fn status(&self) -> Result<ConsumerStatus> {
        Ok(ConsumerStatus {
            connection: self.connection.health().snapshot(),
            backend: self.subscriber.backend(),
            topic: self.topic.clone(),
            group_id: self.group_id.clone(),
            messages_consumed: self.messages_consumed(),
            messages_skipped: self.messages_skipped(),
            events_stored: self.store.len().await?,
            last_message_at: *self.last_message_at.read(),
        })
    }
}
