pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::content::ContentCatalog;
use crate::messaging::{EventConsumer, EventPublisher};
use crate::state::EventStore;
use std::sync::Arc;

/// Shared state of the analytics service
#[derive(Clone)]
pub struct AnalyticsState {
    pub service: String,
    pub store: Arc<dyn EventStore>,
    pub consumer: Arc<EventConsumer>,
    pub default_limit: usize,
    pub brokers: Vec<String>,
    pub client_id: String,
}

impl AnalyticsState {
    pub fn new(service: impl Into<String>, store: Arc<dyn EventStore>, consumer: Arc<EventConsumer>) -> Self {
        Self {
            service: service.into(),
            store,
            consumer,
            default_limit: crate::state::DEFAULT_QUERY_LIMIT,
            brokers: Vec::new(),
            client_id: String::new(),
        }
    }

    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Broker details echoed by `/kafka-status`
    pub fn with_broker_info(mut self, brokers: Vec<String>, client_id: impl Into<String>) -> Self {
        self.brokers = brokers;
        self.client_id = client_id.into();
        self
    }
}

/// Shared state of the content service
#[derive(Clone)]
pub struct ContentState {
    pub service: String,
    pub catalog: ContentCatalog,
    pub publisher: Arc<EventPublisher>,
}

impl ContentState {
    pub fn new(service: impl Into<String>, catalog: ContentCatalog, publisher: Arc<EventPublisher>) -> Self {
        Self {
            service: service.into(),
            catalog,
            publisher,
        }
    }
}
