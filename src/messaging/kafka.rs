//! Kafka broker client

use crate::messaging::config::KafkaConfig;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::events::{DeliveryReceipt, InboundMessage, OutboundRecord};
use crate::messaging::traits::{EventProducer, EventSubscriber, MessageStream};
use async_trait::async_trait;
use parking_lot::RwLock;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration;

const BACKEND: &str = "kafka";

fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("client.id", &config.client_id);

    if config.enable_sasl {
        if let (Some(mechanism), Some(username), Some(password)) = (
            &config.sasl_mechanism,
            &config.sasl_username,
            &config.sasl_password,
        ) {
            client_config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanism", mechanism)
                .set("sasl.username", username)
                .set("sasl.password", password);
        }
    }

    client_config
}

/// Errors that mean the broker is unreachable, as opposed to a rejected message
fn classify_send_error(err: KafkaError) -> MessagingError {
    match err.rdkafka_error_code() {
        Some(
            RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::MessageTimedOut,
        ) => MessagingError::ConnectionFailed(format!("Kafka publish failed: {}", err)),
        _ => MessagingError::PublishFailed(format!("Kafka publish failed: {}", err)),
    }
}

/// Kafka producer
///
/// The underlying `FutureProducer` is created on [`EventProducer::connect`]
/// and dropped on [`EventProducer::disconnect`].
pub struct KafkaProducer {
    producer: RwLock<Option<FutureProducer>>,
    config: KafkaConfig,
}

impl KafkaProducer {
    pub fn new(config: KafkaConfig) -> Self {
        Self {
            producer: RwLock::new(None),
            config,
        }
    }
}

#[async_trait]
impl EventProducer for KafkaProducer {
    async fn connect(&self) -> MessagingResult<()> {
        let mut client_config = base_client_config(&self.config);
        client_config
            .set("compression.type", &self.config.compression_type)
            .set("message.timeout.ms", self.config.message_timeout_ms.to_string());

        let producer: FutureProducer = client_config.create().map_err(|e| {
            MessagingError::ConfigurationError(format!("Kafka producer creation failed: {}", e))
        })?;

        // librdkafka connects lazily; a metadata round-trip proves a broker answers
        let client = producer.clone();
        let timeout = self.config.metadata_timeout();
        tokio::task::spawn_blocking(move || client.client().fetch_metadata(None, timeout).map(|_| ()))
            .await
            .map_err(|e| MessagingError::ConnectionFailed(format!("Metadata request aborted: {}", e)))?
            .map_err(|e| MessagingError::ConnectionFailed(format!("Kafka metadata fetch failed: {}", e)))?;

        *self.producer.write() = Some(producer);
        Ok(())
    }

    async fn send(&self, record: OutboundRecord) -> MessagingResult<DeliveryReceipt> {
        let producer = self
            .producer
            .read()
            .clone()
            .ok_or(MessagingError::NotConnected)?;

        let headers = record
            .headers
            .iter()
            .fold(OwnedHeaders::new(), |headers, (key, value)| {
                headers.insert(Header {
                    key: key.as_str(),
                    value: Some(value.as_str()),
                })
            });

        let future_record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&record.topic)
            .key(record.key.as_str())
            .payload(record.payload.as_slice())
            .headers(headers);

        let (partition, offset) = producer
            .send(future_record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| classify_send_error(e))?;

        Ok(DeliveryReceipt {
            topic: record.topic,
            partition,
            offset,
        })
    }

    async fn disconnect(&self) -> MessagingResult<()> {
        let producer = self.producer.write().take();
        if let Some(producer) = producer {
            let timeout = Duration::from_millis(self.config.message_timeout_ms);
            tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(|e| MessagingError::Timeout(format!("Flush aborted: {}", e)))?
                .map_err(|e| MessagingError::Timeout(format!("Kafka flush failed: {}", e)))?;
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Kafka consumer-group subscriber
///
/// Every call to [`EventSubscriber::subscribe`] builds a fresh consumer, so a
/// retry after a broken connection starts from a clean client.
pub struct KafkaSubscriber {
    config: KafkaConfig,
}

impl KafkaSubscriber {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EventSubscriber for KafkaSubscriber {
    async fn subscribe(&self, topic: &str) -> MessagingResult<Box<dyn MessageStream>> {
        let mut client_config = base_client_config(&self.config);
        client_config
            .set("group.id", &self.config.group_id)
            .set("enable.auto.commit", self.config.enable_auto_commit.to_string())
            .set(
                "auto.commit.interval.ms",
                self.config.auto_commit_interval_ms.to_string(),
            )
            .set("session.timeout.ms", self.config.session_timeout_ms.to_string())
            .set("auto.offset.reset", &self.config.auto_offset_reset);

        let consumer: StreamConsumer = client_config.create().map_err(|e| {
            MessagingError::ConfigurationError(format!("Kafka consumer creation failed: {}", e))
        })?;
        let consumer = Arc::new(consumer);

        let client = consumer.clone();
        let metadata_topic = topic.to_string();
        let timeout = self.config.metadata_timeout();
        tokio::task::spawn_blocking(move || {
            client
                .fetch_metadata(Some(&metadata_topic), timeout)
                .map(|_| ())
        })
        .await
        .map_err(|e| MessagingError::ConnectionFailed(format!("Metadata request aborted: {}", e)))?
        .map_err(|e| MessagingError::ConnectionFailed(format!("Kafka metadata fetch failed: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| MessagingError::SubscribeFailed(format!("Kafka subscribe failed: {}", e)))?;

        Ok(Box::new(KafkaMessageStream { consumer }))
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

/// Kafka message stream
pub struct KafkaMessageStream {
    consumer: Arc<StreamConsumer>,
}

#[async_trait]
impl MessageStream for KafkaMessageStream {
    async fn next(&mut self) -> MessagingResult<Option<InboundMessage>> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| MessagingError::ConsumeFailed(format!("Kafka recv failed: {}", e)))?;

        Ok(Some(InboundMessage {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            payload: msg.payload().map(<[u8]>::to_vec),
        }))
    }

    async fn close(self: Box<Self>) -> MessagingResult<()> {
        // Dropping the last handle closes the consumer, which blocks on the broker
        let consumer = self.consumer;
        tokio::task::spawn_blocking(move || {
            consumer.unsubscribe();
            drop(consumer);
        })
        .await
        .map_err(|e| MessagingError::Timeout(format!("Consumer close aborted: {}", e)))
    }
}
