//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use event_pipeline::messaging::{
    EventConsumer, EventPublisher, InMemoryBroker, RetryPolicy, Sleeper,
};
use event_pipeline::state::InMemoryEventLog;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const TOPIC: &str = "content-events";
pub const GROUP: &str = "analytics-consumers";
pub const SOURCE: &str = "content-service";

/// Records every requested delay and then waits only briefly in real time
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.delays.lock().len()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().push(duration);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn publisher(broker: &InMemoryBroker, sleeper: Arc<RecordingSleeper>) -> Arc<EventPublisher> {
    Arc::new(
        EventPublisher::new(Arc::new(broker.producer()), SOURCE, TOPIC)
            .with_retry_policy(RetryPolicy::default())
            .with_sleeper(sleeper),
    )
}

pub fn consumer(
    broker: &InMemoryBroker,
    store: Arc<InMemoryEventLog>,
    sleeper: Arc<RecordingSleeper>,
) -> Arc<EventConsumer> {
    Arc::new(
        EventConsumer::new(Arc::new(broker.subscriber(GROUP)), store, TOPIC, GROUP)
            .with_retry_policy(RetryPolicy::default())
            .with_sleeper(sleeper),
    )
}
