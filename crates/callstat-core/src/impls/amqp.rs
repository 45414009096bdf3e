//! AMQP (RabbitMQ) implementations of the broker ports, on top of `lapin`.
//!
//! - `AmqpBroker`: long-lived consumer connection (exchange/queue/bindings/prefetch)
//! - `AmqpExchange`: requeue publisher sharing the consumer channel
//! - `AmqpQueueSender`: one fresh connection per send, for reports and seeding

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::BrokerSettings;
use crate::ports::{BrokerError, Delivery, DeliveryStream, QueueSender, Republisher};

const REPLY_SUCCESS: u16 = 200;
const PERSISTENT: u8 = 2;
const JSON_CONTENT_TYPE: &str = "application/json";

async fn connect(uri: &str, timeout: Duration) -> Result<Connection, BrokerError> {
    tokio::time::timeout(timeout, Connection::connect(uri, ConnectionProperties::default()))
        .await
        .map_err(|_| BrokerError::ConnectTimeout(timeout))?
        .map_err(BrokerError::from)
}

fn json_properties() -> BasicProperties {
    BasicProperties::default()
        .with_delivery_mode(PERSISTENT)
        .with_content_type(JSON_CONTENT_TYPE.into())
}

fn durable_queue() -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    }
}

/// Consumer-side connection with its topology declared.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    settings: BrokerSettings,
}

impl AmqpBroker {
    /// Connect and declare: durable direct exchange, durable queue bound to every task
    /// routing key, prefetch bound.
    pub async fn connect(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let connection = connect(&settings.uri, settings.connect_timeout).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &settings.exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(&settings.task_queue, durable_queue(), FieldTable::default())
            .await?;
        for routing_key in &settings.task_routing_keys {
            channel
                .queue_bind(
                    &settings.task_queue,
                    &settings.exchange,
                    routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        channel
            .basic_qos(settings.prefetch, BasicQosOptions::default())
            .await?;

        info!(
            exchange = %settings.exchange,
            queue = %settings.task_queue,
            routing_keys = ?settings.task_routing_keys,
            prefetch = settings.prefetch,
            "Consumer connected and ready to consume messages"
        );

        Ok(Self {
            connection,
            channel,
            settings: settings.clone(),
        })
    }

    pub async fn deliveries(&self) -> Result<AmqpDeliveries, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.settings.task_queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(AmqpDeliveries { consumer })
    }

    pub fn republisher(&self) -> AmqpExchange {
        AmqpExchange {
            channel: self.channel.clone(),
            exchange: self.settings.exchange.clone(),
        }
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.connection.close(REPLY_SUCCESS, "shutdown").await?;
        Ok(())
    }
}

pub struct AmqpDeliveries {
    consumer: lapin::Consumer,
}

#[async_trait]
impl DeliveryStream for AmqpDeliveries {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(|delivery| Box::new(AmqpDelivery(delivery)) as Box<dyn Delivery>)
                .map_err(BrokerError::from),
        )
    }
}

struct AmqpDelivery(lapin::message::Delivery);

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.0.data
    }

    fn routing_key(&self) -> &str {
        self.0.routing_key.as_str()
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.0.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

/// Publishes requeued messages to the consumer's exchange.
#[derive(Clone)]
pub struct AmqpExchange {
    channel: Channel,
    exchange: String,
}

#[async_trait]
impl Republisher for AmqpExchange {
    async fn republish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                json_properties(),
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Sends each body over its own connection: connect, declare the durable queue,
/// publish via the default exchange, wait for the broker confirm, close.
pub struct AmqpQueueSender {
    uri: String,
    queue: String,
    routing_key: String,
    connect_timeout: Duration,
}

impl AmqpQueueSender {
    pub fn new(
        uri: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            uri: uri.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
            connect_timeout,
        }
    }

    /// Sender for the report queue described by `settings`.
    pub fn for_reports(settings: &BrokerSettings) -> Self {
        Self::new(
            settings.uri.clone(),
            settings.report_queue.clone(),
            settings.report_routing_key.clone(),
            settings.connect_timeout,
        )
    }

    async fn publish_on(&self, connection: &Connection, body: &[u8]) -> Result<(), BrokerError> {
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel
            .queue_declare(&self.queue, durable_queue(), FieldTable::default())
            .await?;
        let confirmation = channel
            .basic_publish(
                "",
                &self.routing_key,
                BasicPublishOptions::default(),
                body,
                json_properties(),
            )
            .await?
            .await?;
        if confirmation.is_nack() {
            return Err(BrokerError::NotConfirmed);
        }
        Ok(())
    }
}

#[async_trait]
impl QueueSender for AmqpQueueSender {
    async fn send(&self, body: &[u8]) -> Result<(), BrokerError> {
        let connection = connect(&self.uri, self.connect_timeout).await?;
        let result = self.publish_on(&connection, body).await;
        if let Err(e) = connection.close(REPLY_SUCCESS, "OK").await {
            debug!(error = %e, queue = %self.queue, "Closing publisher connection failed");
        }
        if result.is_ok() {
            debug!(queue = %self.queue, bytes = body.len(), "Message sent");
        }
        result
    }
}
