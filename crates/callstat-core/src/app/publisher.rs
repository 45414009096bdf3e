//! ReportPublisher - sends finished reports with a bounded, fixed-delay retry.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::Report;
use crate::ports::{BrokerError, QueueSender};

/// How hard to try before giving up on one report.
#[derive(Debug, Clone)]
pub struct PublishPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub delay: Duration,
}

impl PublishPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100))
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("report not published after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: BrokerError,
    },
}

pub struct ReportPublisher {
    sender: Arc<dyn QueueSender>,
    policy: PublishPolicy,
}

impl ReportPublisher {
    pub fn new(sender: Arc<dyn QueueSender>) -> Self {
        Self::with_policy(sender, PublishPolicy::default())
    }

    pub fn with_policy(sender: Arc<dyn QueueSender>, policy: PublishPolicy) -> Self {
        Self { sender, policy }
    }

    /// Publish one report. On exhaustion the last transport error is returned.
    pub async fn publish(&self, report: &Report) -> Result<(), PublishError> {
        let body = serde_json::to_vec(report)?;
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.sender.send(&body).await {
                Ok(()) => {
                    info!(
                        correlation_id = %report.correlation_id,
                        attempt,
                        entries = report.results.len(),
                        "Report published"
                    );
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        correlation_id = %report.correlation_id,
                        attempt,
                        error = %e,
                        "Report publish failed, retrying"
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        correlation_id = %report.correlation_id,
                        attempts,
                        error = %e,
                        "Report publish failed, giving up"
                    );
                    return Err(PublishError::Exhausted {
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }
}
