use crate::error::Result;
use crate::messaging::{event_id, IngestedEvent, StoredEvent};
use crate::state::{EventQuery, EventStats, EventStore, QueryResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
struct LogInner {
    events: Vec<StoredEvent>,
    last_sequence: u64,
}

/// In-memory event log. Unbounded; nothing is ever evicted.
///
/// Id assignment and append happen under one write lock, so readers on other
/// threads never see an id out of append order or a half-written entry.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    inner: Arc<RwLock<LogInner>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventLog {
    async fn append(&self, event: IngestedEvent) -> Result<StoredEvent> {
        let mut inner = self.inner.write();
        inner.last_sequence += 1;
        let stored = event.into_stored(event_id(inner.last_sequence));
        inner.events.push(stored.clone());

        tracing::debug!(event_id = %stored.id, action = %stored.action, "Event appended");
        Ok(stored)
    }

    async fn query(&self, query: &EventQuery) -> Result<QueryResult> {
        let inner = self.inner.read();
        let limit = query.effective_limit();

        let mut matched = 0;
        let mut events: Vec<StoredEvent> = Vec::new();
        for event in inner.events.iter().rev().filter(|e| query.matches(e)) {
            matched += 1;
            if events.len() < limit {
                events.push(event.clone());
            }
        }
        events.reverse();

        Ok(QueryResult {
            total: inner.events.len(),
            matched,
            returned: events.len(),
            events,
        })
    }

    async fn stats(&self) -> Result<EventStats> {
        let inner = self.inner.read();
        let mut stats = EventStats {
            total_events: inner.events.len(),
            ..Default::default()
        };

        for event in &inner.events {
            *stats.by_source.entry(event.source.clone()).or_insert(0) += 1;
            *stats.by_action.entry(event.action.clone()).or_insert(0) += 1;
        }

        Ok(stats)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.read().events.len())
    }
}
