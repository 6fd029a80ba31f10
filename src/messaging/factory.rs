use crate::messaging::config::{MessagingBackend, MessagingConfig};
use crate::messaging::kafka::{KafkaProducer, KafkaSubscriber};
use crate::messaging::memory::InMemoryBroker;
use crate::messaging::traits::{EventProducer, EventSubscriber};
use std::sync::Arc;

/// Create the producer for the configured backend.
///
/// With the in-memory backend the producer publishes into a broker local to
/// this process; nothing leaves it.
pub fn create_producer(config: &MessagingConfig) -> Arc<dyn EventProducer> {
    match config.backend {
        MessagingBackend::Kafka => {
            tracing::info!(
                brokers = %config.kafka.bootstrap_servers,
                topic = %config.topic,
                "Using Kafka producer"
            );
            Arc::new(KafkaProducer::new(config.kafka.clone()))
        }
        MessagingBackend::InMemory => {
            tracing::warn!("Using in-memory broker; events stay inside this process");
            Arc::new(InMemoryBroker::new().producer())
        }
    }
}

/// Create the consumer-group subscriber for the configured backend
pub fn create_subscriber(config: &MessagingConfig) -> Arc<dyn EventSubscriber> {
    match config.backend {
        MessagingBackend::Kafka => {
            tracing::info!(
                brokers = %config.kafka.bootstrap_servers,
                topic = %config.topic,
                group_id = %config.kafka.group_id,
                "Using Kafka consumer"
            );
            Arc::new(KafkaSubscriber::new(config.kafka.clone()))
        }
        MessagingBackend::InMemory => {
            tracing::warn!("Using in-memory broker; only events published in this process arrive");
            Arc::new(InMemoryBroker::new().subscriber(config.kafka.group_id.clone()))
        }
    }
}
