pub mod store;

pub use store::InMemoryEventLog;

use crate::error::Result;
use crate::messaging::{IngestedEvent, StoredEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of events returned when a query sets no limit
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Append-only event log held by the consumer
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Assign the next sequence id and append. Ids follow append order.
    async fn append(&self, event: IngestedEvent) -> Result<StoredEvent>;

    /// Most recent matching events, oldest first
    async fn query(&self, query: &EventQuery) -> Result<QueryResult>;

    /// Lifetime counts per source and per action
    async fn stats(&self) -> Result<EventStats>;

    /// Number of events held
    async fn len(&self) -> Result<usize>;
}

/// Exact-match filters and a recency limit
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventQuery {
    pub source: Option<String>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn by_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Default::default()
        }
    }

    pub fn by_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Empty filter values are treated as absent
    pub fn matches(&self, event: &StoredEvent) -> bool {
        let source_ok = match self.source.as_deref() {
            Some(source) if !source.is_empty() => event.source == source,
            _ => true,
        };
        let action_ok = match self.action.as_deref() {
            Some(action) if !action.is_empty() => event.action == action,
            _ => true,
        };
        source_ok && action_ok
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_QUERY_LIMIT)
    }
}

/// Result of an [`EventQuery`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Size of the whole log, unfiltered
    pub total: usize,
    /// Events matching the filters before the limit was applied
    pub matched: usize,
    /// Events returned
    pub returned: usize,
    pub events: Vec<StoredEvent>,
}

/// Lifetime aggregate over the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total_events: usize,
    pub by_source: BTreeMap<String, u64>,
    pub by_action: BTreeMap<String, u64>,
}
