//! Event types carried over the broker and held in the event log

use crate::messaging::error::{MessagingError, MessagingResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys assigned by the consumer; producer-supplied values for them are discarded
const RESERVED_KEYS: [&str; 3] = ["id", "receivedAt", "transportMeta"];

const CORE_KEYS: [&str; 4] = ["source", "action", "itemId", "ts"];

/// Domain event as published on the topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Producing service
    pub source: String,

    /// Domain verb (view, create, delete, ...)
    pub action: String,

    /// Affected entity, if any
    #[serde(default)]
    pub item_id: Option<String>,

    /// Producer timestamp
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,

    /// Any additional fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventPayload {
    pub fn new(source: impl Into<String>, action: impl Into<String>, item_id: Option<String>) -> Self {
        Self {
            source: source.into(),
            action: action.into(),
            item_id,
            ts: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Merge additional fields into the event. Fields named like the core
    /// ones are ignored.
    pub fn with_extra(mut self, extra: Map<String, Value>) -> Self {
        self.extra.extend(
            extra
                .into_iter()
                .filter(|(key, _)| !CORE_KEYS.contains(&key.as_str())),
        );
        self
    }

    /// Partition key: the entity identifier, or the action when there is none
    pub fn routing_key(&self) -> &str {
        self.item_id.as_deref().unwrap_or(&self.action)
    }

    /// Parse and validate a raw message payload
    pub fn parse(bytes: &[u8]) -> MessagingResult<Self> {
        let payload: EventPayload = serde_json::from_slice(bytes)
            .map_err(|e| MessagingError::InvalidMessage(e.to_string()))?;
        payload.sanitized()
    }

    /// Same checks as [`EventPayload::parse`] for an already decoded body
    pub fn from_value(value: Value) -> MessagingResult<Self> {
        let payload: EventPayload = serde_json::from_value(value)
            .map_err(|e| MessagingError::InvalidMessage(e.to_string()))?;
        payload.sanitized()
    }

    fn sanitized(mut self) -> MessagingResult<Self> {
        self.validate()?;
        self.extra.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Ok(self)
    }

    /// `source` and `action` must be non-empty
    pub fn validate(&self) -> MessagingResult<()> {
        if self.source.trim().is_empty() {
            return Err(MessagingError::InvalidMessage("source is required".to_string()));
        }
        if self.action.trim().is_empty() {
            return Err(MessagingError::InvalidMessage("action is required".to_string()));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> MessagingResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Broker provenance of a delivered event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportMeta {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
}

/// Raw message handed over by a broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn transport_meta(&self) -> TransportMeta {
        TransportMeta {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            key: self
                .key
                .as_deref()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
        }
    }
}

/// Message ready to be handed to a broker client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

/// Where the broker stored a published message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// An event accepted for ingestion that has not been assigned an id yet
#[derive(Debug, Clone)]
pub struct IngestedEvent {
    pub payload: EventPayload,
    pub received_at: DateTime<Utc>,
    pub transport_meta: Option<TransportMeta>,
}

impl IngestedEvent {
    /// Event delivered by the broker
    pub fn from_broker(payload: EventPayload, message: &InboundMessage) -> Self {
        Self {
            payload,
            received_at: Utc::now(),
            transport_meta: Some(message.transport_meta()),
        }
    }

    /// Event posted straight to the consumer, bypassing the broker
    pub fn direct(payload: EventPayload) -> Self {
        Self {
            payload,
            received_at: Utc::now(),
            transport_meta: None,
        }
    }

    pub fn into_stored(self, id: String) -> StoredEvent {
        StoredEvent {
            id,
            source: self.payload.source,
            action: self.payload.action,
            item_id: self.payload.item_id,
            ts: self.payload.ts,
            received_at: self.received_at,
            transport_meta: self.transport_meta,
            extra: self.payload.extra,
        }
    }
}

/// An event held in the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: String,
    pub source: String,
    pub action: String,
    pub item_id: Option<String>,
    pub ts: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_meta: Option<TransportMeta>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Format a per-process sequence number as an event id (`E00001`)
pub fn event_id(sequence: u64) -> String {
    format!("E{:05}", sequence)
}
