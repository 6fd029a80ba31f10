//! Broker client abstractions

use crate::messaging::error::MessagingResult;
use crate::messaging::events::{DeliveryReceipt, InboundMessage, OutboundRecord};
use async_trait::async_trait;

/// Producer side of a broker client
#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Establish (or verify) the broker connection
    async fn connect(&self) -> MessagingResult<()>;

    /// Hand one record to the broker and wait for its acknowledgement
    async fn send(&self, record: OutboundRecord) -> MessagingResult<DeliveryReceipt>;

    /// Flush and release the connection
    async fn disconnect(&self) -> MessagingResult<()>;

    /// Backend name for logs and status output
    fn backend(&self) -> &'static str;
}

/// Consumer side of a broker client
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Connect, join the consumer group and subscribe to `topic`
    async fn subscribe(&self, topic: &str) -> MessagingResult<Box<dyn MessageStream>>;

    /// Backend name for logs and status output
    fn backend(&self) -> &'static str;
}

/// Messages delivered to a subscription, in broker order per partition
#[async_trait]
pub trait MessageStream: Send {
    /// Next message. `Ok(None)` means the subscription ended, an error means
    /// the connection is no longer usable.
    async fn next(&mut self) -> MessagingResult<Option<InboundMessage>>;

    /// Leave the consumer group and release the client
    async fn close(self: Box<Self>) -> MessagingResult<()>;
}
