//! ResilientConsumer - 配送ループ
//!
//! # フロー
//! 1. DeliveryStream::next() でメッセージ取得（prefetch 分の permit を先に確保）
//! 2. RetryEnvelope として parse（JSON object 以外は破棄して ack）
//! 3. Task に decode して MessageHandler に渡す
//! 4. 成功 → ack
//! 5. Retryable → RetryPolicy::decide で Requeue / Throttle / Discard
//! 6. Fatal → ack せずにループ全体を失敗させる
//!
//! Requeue publishes a new message with `retry + 1` on the same routing key and then
//! acks the original; broker-native redelivery is never used.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::handler::MessageHandler;
use super::shutdown::Shutdown;
use super::status::{ConsumerCounts, ConsumerStats};
use crate::domain::{HandleError, RetryDecision, RetryEnvelope, RetryPolicy};
use crate::ports::{BrokerError, Delivery, DeliveryStream, Republisher};

pub const DEFAULT_PREFETCH: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("delivery stream ended, connection to the broker is gone")]
    StreamClosed,

    #[error("handler failed fatally: {0}")]
    Fatal(#[source] HandleError),

    #[error("failed to encode requeued message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("message task failed: {0}")]
    Join(#[from] JoinError),
}

/// What happened to one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Requeued { retry: i64 },
    /// Retry budget exhausted; held for the throttle delay, then acked.
    Throttled,
    /// Acked without processing (unparseable body, or counter past the budget).
    Discarded,
}

struct Inner<H> {
    handler: Arc<H>,
    policy: RetryPolicy,
    shutdown: Shutdown,
    stats: ConsumerStats,
}

pub struct ResilientConsumer<H> {
    inner: Arc<Inner<H>>,
    prefetch: usize,
}

impl<H: MessageHandler> ResilientConsumer<H> {
    pub fn new(handler: Arc<H>, shutdown: Shutdown) -> Self {
        Self::with_policy(handler, shutdown, RetryPolicy::default())
    }

    pub fn with_policy(handler: Arc<H>, shutdown: Shutdown, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                handler,
                policy,
                shutdown,
                stats: ConsumerStats::default(),
            }),
            prefetch: DEFAULT_PREFETCH,
        }
    }

    /// Cap on messages processed at once. Match it to the broker prefetch.
    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    pub fn counts(&self) -> ConsumerCounts {
        self.inner.stats.snapshot()
    }

    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.inner.shutdown
    }

    /// Handle a single delivery to completion.
    pub async fn process(
        &self,
        delivery: Box<dyn Delivery>,
        republisher: &dyn Republisher,
    ) -> Result<Disposition, ConsumerError> {
        self.inner.process(delivery, republisher).await
    }

    /// Consume until shutdown or until the stream fails.
    ///
    /// Returns `Ok(())` only after a shutdown, once every in-flight message has
    /// finished. A closed stream, a broker error or a fatal handler error ends the run
    /// with `Err` (in-flight messages are still drained first).
    pub async fn run<S: DeliveryStream>(
        &self,
        mut deliveries: S,
        republisher: Arc<dyn Republisher>,
    ) -> Result<(), ConsumerError> {
        let permits = Arc::new(Semaphore::new(self.prefetch));
        let mut in_flight: JoinSet<Result<Disposition, ConsumerError>> = JoinSet::new();
        info!(prefetch = self.prefetch, "Consumer started");

        let mut outcome = loop {
            tokio::select! {
                biased;

                _ = self.inner.shutdown.cancelled() => {
                    info!("Shutdown requested, no longer taking deliveries");
                    break Ok(());
                }

                Some(joined) = in_flight.join_next() => {
                    if let Err(e) = flatten(joined) {
                        break Err(e);
                    }
                }

                next = next_delivery(&mut deliveries, &permits) => match next {
                    None => break Err(ConsumerError::StreamClosed),
                    Some((Err(e), _)) => break Err(e.into()),
                    Some((Ok(delivery), permit)) => {
                        let inner = Arc::clone(&self.inner);
                        let republisher = Arc::clone(&republisher);
                        in_flight.spawn(async move {
                            let _permit = permit;
                            inner.process(delivery, republisher.as_ref()).await
                        });
                    }
                },
            }
        };

        if let Err(e) = &outcome {
            error!(error = %e, "Consumer stopping");
            // releases throttled messages held by in-flight tasks
            self.inner.shutdown.trigger();
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Waiting for in-flight messages");
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = flatten(joined) {
                error!(error = %e, "In-flight message failed during drain");
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        info!(counts = ?self.counts(), "Consumer stopped");
        outcome
    }
}

async fn next_delivery<S: DeliveryStream>(
    deliveries: &mut S,
    permits: &Arc<Semaphore>,
) -> Option<(Result<Box<dyn Delivery>, BrokerError>, OwnedSemaphorePermit)> {
    let permit = Arc::clone(permits).acquire_owned().await.ok()?;
    let delivery = deliveries.next().await?;
    Some((delivery, permit))
}

fn flatten(
    joined: Result<Result<Disposition, ConsumerError>, JoinError>,
) -> Result<Disposition, ConsumerError> {
    joined?
}

impl<H: MessageHandler> Inner<H> {
    async fn process(
        &self,
        delivery: Box<dyn Delivery>,
        republisher: &dyn Republisher,
    ) -> Result<Disposition, ConsumerError> {
        let span = info_span!(
            "message",
            routing_key = %delivery.routing_key(),
            correlation_id = tracing::field::Empty,
        );
        self.process_delivery(delivery, republisher)
            .instrument(span)
            .await
    }

    async fn process_delivery(
        &self,
        delivery: Box<dyn Delivery>,
        republisher: &dyn Republisher,
    ) -> Result<Disposition, ConsumerError> {
        self.stats.received();

        let envelope = match RetryEnvelope::parse(delivery.body()) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    error = %e,
                    body = %String::from_utf8_lossy(delivery.body()),
                    "Message body is not a JSON object, discarding"
                );
                delivery.ack().await?;
                self.stats.acked();
                self.stats.discarded();
                return Ok(Disposition::Discarded);
            }
        };
        if let Some(correlation_id) = envelope.get("correlation_id") {
            tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));
        }

        let result = match envelope.decode::<H::Task>() {
            Ok(task) => self.handler.handle(task).await.map(|_| ()),
            Err(e) => Err(HandleError::retryable("failed to decode task").with_source(e)),
        };

        match result {
            Ok(()) => {
                delivery.ack().await?;
                self.stats.acked();
                debug!("Message processed and acknowledged");
                Ok(Disposition::Acked)
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Handler failed fatally, message left unacknowledged");
                Err(ConsumerError::Fatal(e))
            }
            Err(e) => self.retry(delivery, &envelope, e, republisher).await,
        }
    }

    async fn retry(
        &self,
        delivery: Box<dyn Delivery>,
        envelope: &RetryEnvelope,
        cause: HandleError,
        republisher: &dyn Republisher,
    ) -> Result<Disposition, ConsumerError> {
        let retry = envelope.retry();
        let body = String::from_utf8_lossy(delivery.body()).into_owned();

        let disposition = match self.policy.decide(retry) {
            RetryDecision::Requeue { next } => {
                warn!(error = %cause, retry, body = %body, "Processing failed, requeueing message");
                republisher
                    .republish(delivery.routing_key(), envelope.with_retry(next).to_vec()?)
                    .await?;
                self.stats.requeued();
                Disposition::Requeued { retry: next }
            }
            RetryDecision::Throttle { delay } => {
                error!(
                    error = %cause,
                    retry,
                    body = %body,
                    delay_secs = delay.as_secs(),
                    "Retry budget exhausted, holding message before dropping it"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.cancelled() => {
                        info!("Shutdown requested, cutting throttle short");
                    }
                }
                self.stats.throttled();
                Disposition::Throttled
            }
            RetryDecision::Discard => {
                warn!(error = %cause, retry, body = %body, "Retry counter past the limit, dropping message");
                self.stats.discarded();
                Disposition::Discarded
            }
        };

        delivery.ack().await?;
        self.stats.acked();
        Ok(disposition)
    }
}
