//! InMemoryBroker - 開発用・テスト用のブローカー
//!
//! Models one queue bound to every routing key: messages pushed by a producer and
//! messages republished by the consumer both land at the back of the same channel.
//! Acks and republishes are recorded so tests can inspect what the consumer did.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::ports::{BrokerError, Delivery, DeliveryStream, QueueSender, Republisher};

type Message = (String, Vec<u8>);

#[derive(Default)]
struct BrokerLog {
    acked: Vec<Message>,
    republished: Vec<Message>,
}

struct BrokerState {
    sender: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    log: Mutex<BrokerLog>,
}

impl BrokerState {
    fn log(&self) -> std::sync::MutexGuard<'_, BrokerLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(BrokerState {
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                log: Mutex::new(BrokerLog::default()),
            }),
        }
    }

    /// Enqueue a message as a producer would.
    pub fn push(&self, routing_key: &str, body: impl Into<Vec<u8>>) -> Result<(), BrokerError> {
        let sender = self
            .state
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sender
            .as_ref()
            .ok_or_else(|| BrokerError::Unavailable("broker is closed".to_string()))?
            .send((routing_key.to_string(), body.into()))
            .map_err(|_| BrokerError::Unavailable("no consumer attached".to_string()))
    }

    /// Take the consuming end. There is only one per broker.
    pub fn deliveries(&self) -> Option<InMemoryDeliveries> {
        let receiver = self
            .state
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(InMemoryDeliveries {
            receiver,
            state: Arc::clone(&self.state),
        })
    }

    /// Simulate a lost connection: the delivery stream ends once drained.
    pub fn close(&self) {
        self.state
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn acked(&self) -> Vec<(String, Vec<u8>)> {
        self.state.log().acked.clone()
    }

    pub fn republished(&self) -> Vec<(String, Vec<u8>)> {
        self.state.log().republished.clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Republisher for InMemoryBroker {
    async fn republish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), BrokerError> {
        self.state
            .log()
            .republished
            .push((routing_key.to_string(), body.clone()));
        self.push(routing_key, body)
    }
}

pub struct InMemoryDeliveries {
    receiver: mpsc::UnboundedReceiver<Message>,
    state: Arc<BrokerState>,
}

#[async_trait]
impl DeliveryStream for InMemoryDeliveries {
    async fn next(&mut self) -> Option<Result<Box<dyn Delivery>, BrokerError>> {
        let (routing_key, body) = self.receiver.recv().await?;
        Some(Ok(Box::new(InMemoryDelivery {
            routing_key,
            body,
            state: Arc::clone(&self.state),
        })))
    }
}

struct InMemoryDelivery {
    routing_key: String,
    body: Vec<u8>,
    state: Arc<BrokerState>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    fn routing_key(&self) -> &str {
        &self.routing_key
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        let this = *self;
        this.state.log().acked.push((this.routing_key, this.body));
        Ok(())
    }
}

/// Records sent bodies; can be told to fail a number of upcoming attempts.
#[derive(Debug, Default)]
pub struct InMemoryQueueSender {
    sent: Mutex<Vec<Vec<u8>>>,
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl InMemoryQueueSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(times: u32) -> Self {
        let sender = Self::default();
        sender.fail_next(times);
        sender
    }

    pub fn fail_next(&self, times: u32) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl QueueSender for InMemoryQueueSender {
    async fn send(&self, body: &[u8]) -> Result<(), BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BrokerError::Unavailable(format!(
                "connection refused (attempt {attempt})"
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body.to_vec());
        Ok(())
    }
}
