//! Broker ports - the message transport seen by the consumer and the publisher.
//!
//! - `DeliveryStream` yields leased deliveries from the task queue
//! - `Delivery` is one unacknowledged message; the holder must ack it
//! - `Republisher` publishes to the consumer's exchange by routing key (requeue)
//! - `QueueSender` publishes one body to a fixed queue, one connection per call

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("timed out connecting to broker after {0:?}")]
    ConnectTimeout(Duration),

    #[error("publish was not confirmed by the broker")]
    NotConfirmed,

    #[error("{0}")]
    Unavailable(String),
}

/// A leased message.
///
/// The consumer owns the delivery until it calls
/// `ack`. Dropping it unacked leaves redelivery to the broker.
#[async_trait]
pub trait Delivery: Send + Sync {
    fn body(&self) -> &[u8];

    /// Routing key the message arrived with. Requeues go back to the same key.
    fn routing_key(&self) -> &str;

    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait DeliveryStream: Send {
    /// Next delivery. `None` means the underlying connection is gone for good.
    ///
    /// Must be cancel safe: the consumer polls it inside `select!`.
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>>;
}

#[async_trait]
pub trait Republisher: Send + Sync {
    async fn republish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, body: &[u8]) -> Result<(), BrokerError>;
}
