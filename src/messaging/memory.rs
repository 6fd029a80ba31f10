//! Process-local broker
//!
//! One partition per topic, consumer-group offsets starting at the earliest
//! message, and an availability switch to simulate outages. Offsets are
//! committed as soon as a message is handed out, like auto-commit.

use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::events::{DeliveryReceipt, InboundMessage, OutboundRecord};
use crate::messaging::traits::{EventProducer, EventSubscriber, MessageStream};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const BACKEND: &str = "in_memory";
const PARTITION: i32 = 0;

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, Vec<InboundMessage>>,
    group_offsets: HashMap<(String, String), usize>,
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    available: AtomicBool,
    notify: Notify,
}

/// Shared in-memory broker. Clones refer to the same broker.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                available: AtomicBool::new(true),
                notify: Notify::new(),
            }),
        }
    }

    /// Take the broker down or bring it back. Open subscriptions fail on their
    /// next read while the broker is down.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            broker: self.clone(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn subscriber(&self, group_id: impl Into<String>) -> InMemorySubscriber {
        InMemorySubscriber {
            broker: self.clone(),
            group_id: group_id.into(),
        }
    }

    /// Append a raw message straight onto a topic, whatever its payload
    pub fn inject(&self, topic: &str, key: Option<&str>, payload: &[u8]) -> i64 {
        self.append(topic, key.map(|k| k.as_bytes().to_vec()), payload.to_vec())
    }

    /// All messages currently on `topic`
    pub fn messages(&self, topic: &str) -> Vec<InboundMessage> {
        self.inner
            .state
            .lock()
            .topics
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Next offset `group_id` will read from `topic`
    pub fn committed_offset(&self, group_id: &str, topic: &str) -> usize {
        self.inner
            .state
            .lock()
            .group_offsets
            .get(&(group_id.to_string(), topic.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn append(&self, topic: &str, key: Option<Vec<u8>>, payload: Vec<u8>) -> i64 {
        let offset = {
            let mut state = self.inner.state.lock();
            let log = state.topics.entry(topic.to_string()).or_default();
            let offset = log.len() as i64;
            log.push(InboundMessage {
                topic: topic.to_string(),
                partition: PARTITION,
                offset,
                key,
                payload: Some(payload),
            });
            offset
        };
        self.inner.notify.notify_waiters();
        offset
    }

    fn take_next(&self, group_id: &str, topic: &str) -> Option<InboundMessage> {
        let mut state = self.inner.state.lock();
        let BrokerState {
            topics,
            group_offsets,
        } = &mut *state;
        let offset = group_offsets
            .entry((group_id.to_string(), topic.to_string()))
            .or_insert(0);
        let message = topics.get(topic)?.get(*offset).cloned()?;
        *offset += 1;
        Some(message)
    }

    fn ensure_available(&self, what: &str) -> MessagingResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(MessagingError::ConnectionFailed(format!("{}: broker unavailable", what)))
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle on an [`InMemoryBroker`]
pub struct InMemoryProducer {
    broker: InMemoryBroker,
    connected: AtomicBool,
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn connect(&self) -> MessagingResult<()> {
        self.broker.ensure_available("connect")?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, record: OutboundRecord) -> MessagingResult<DeliveryReceipt> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(MessagingError::NotConnected);
        }
        self.broker.ensure_available("send")?;

        let offset = self
            .broker
            .append(&record.topic, Some(record.key.into_bytes()), record.payload);

        Ok(DeliveryReceipt {
            topic: record.topic,
            partition: PARTITION,
            offset,
        })
    }

    async fn disconnect(&self) -> MessagingResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Consumer-group handle on an [`InMemoryBroker`]
pub struct InMemorySubscriber {
    broker: InMemoryBroker,
    group_id: String,
}

#[async_trait]
impl EventSubscriber for InMemorySubscriber {
    async fn subscribe(&self, topic: &str) -> MessagingResult<Box<dyn MessageStream>> {
        self.broker.ensure_available("subscribe")?;
        Ok(Box::new(InMemoryStream {
            broker: self.broker.clone(),
            group_id: self.group_id.clone(),
            topic: topic.to_string(),
        }))
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Subscription on an [`InMemoryBroker`] topic
pub struct InMemoryStream {
    broker: InMemoryBroker,
    group_id: String,
    topic: String,
}

#[async_trait]
impl MessageStream for InMemoryStream {
    async fn next(&mut self) -> MessagingResult<Option<InboundMessage>> {
        loop {
            // Registered before checking so a concurrent append cannot be missed
            let notified = self.broker.inner.notify.notified();

            self.broker.ensure_available("consume")?;
            if let Some(message) = self.broker.take_next(&self.group_id, &self.topic) {
                return Ok(Some(message));
            }

            notified.await;
        }
    }

    async fn close(self: Box<Self>) -> MessagingResult<()> {
        Ok(())
    }
}
