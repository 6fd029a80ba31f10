//! Event streaming between the content and analytics services
//!
//! The content service owns an [`EventPublisher`]; the analytics service owns
//! an [`EventConsumer`] feeding an [`EventStore`](crate::state::EventStore).
//! Both sit on top of the broker client traits, so Kafka and the in-memory
//! broker are interchangeable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐             ┌──────────────────────┐
//! │   EventPublisher     │             │    EventConsumer     │
//! │  - publish()         │             │  - run()             │
//! │  - shutdown()        │             │  - handle_message()  │
//! └──────────┬───────────┘             └──────────┬───────────┘
//!            │ EventProducer                      │ EventSubscriber
//!            ▼                                    ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │      KafkaProducer / KafkaSubscriber  |  InMemoryBroker      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each side holds a [`ConnectionStateMachine`]; connection failures are
//! retried forever on a fixed delay and never reach HTTP callers.
//!
//! # Example
//!
//! ```no_run
//! use event_pipeline::messaging::{EventPublisher, InMemoryBroker};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = InMemoryBroker::new();
//!     let publisher = Arc::new(EventPublisher::new(
//!         Arc::new(broker.producer()),
//!         "content-service",
//!         "content-events",
//!     ));
//!     publisher.start();
//!
//!     // Never fails; a dropped event is only logged
//!     let outcome = publisher
//!         .publish("create", Some("C001"), serde_json::Map::new())
//!         .await;
//!     println!("{:?}", outcome);
//! }
//! ```

mod config;
mod connection;
mod consumer;
mod error;
mod events;
mod factory;
mod kafka;
mod memory;
mod metrics;
mod publisher;
mod retry;
mod traits;

pub use config::{KafkaConfig, MessagingBackend, MessagingConfig};
pub use connection::{
    ConnectionHealth, ConnectionSnapshot, ConnectionState, ConnectionStateMachine, StateTransition,
};
pub use consumer::{ConsumerStatus, EventConsumer};
pub use error::{MessagingError, MessagingResult};
pub use events::{
    event_id, DeliveryReceipt, EventPayload, InboundMessage, IngestedEvent, OutboundRecord,
    StoredEvent, TransportMeta,
};
pub use factory::{create_producer, create_subscriber};
pub use kafka::{KafkaMessageStream, KafkaProducer, KafkaSubscriber};
pub use memory::{InMemoryBroker, InMemoryProducer, InMemoryStream, InMemorySubscriber};
pub use metrics::{gather_metrics, init_pipeline_metrics, PIPELINE_METRICS};
pub use publisher::{DropReason, EventPublisher, PublishOutcome, PublisherStatus};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use traits::{EventProducer, EventSubscriber, MessageStream};
