//! Decision model: what the consumer does with a message whose processing failed.
//!
//! The policy is a pure function of the retry counter carried by the message. Executing
//! the decision (republish, sleep, ack) is the consumer's job.

use std::time::Duration;

/// Requeues allowed before a message is treated as poison.
pub const MAX_RETRY: u32 = 5;

/// How long a poison message holds its processing slot before it is dropped.
pub const POISON_THROTTLE_DELAY: Duration = Duration::from_secs(600);

/// The next action for a failed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Republish the body with `retry = next` on the same routing key, then ack.
    Requeue { next: i64 },

    /// Retry budget exhausted: wait `delay`, then ack without requeue.
    Throttle { delay: Duration },

    /// Counter already past the budget: ack, nothing else.
    Discard,
}

/// Bounded requeue policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retry: u32,
    pub throttle_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retry: u32, throttle_delay: Duration) -> Self {
        Self {
            max_retry,
            throttle_delay,
        }
    }

    /// Decide based on the counter read from the failed message.
    ///
    /// A negative counter is below the budget like any other: it is bumped by one.
    pub fn decide(&self, retry: i64) -> RetryDecision {
        match retry.cmp(&i64::from(self.max_retry)) {
            std::cmp::Ordering::Less => RetryDecision::Requeue { next: retry + 1 },
            std::cmp::Ordering::Equal => RetryDecision::Throttle {
                delay: self.throttle_delay,
            },
            std::cmp::Ordering::Greater => RetryDecision::Discard,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(MAX_RETRY, POISON_THROTTLE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::first_failure(0, RetryDecision::Requeue { next: 1 })]
    #[case::last_requeue(4, RetryDecision::Requeue { next: 5 })]
    #[case::poison(5, RetryDecision::Throttle { delay: POISON_THROTTLE_DELAY })]
    #[case::past_budget(6, RetryDecision::Discard)]
    #[case::negative(-1, RetryDecision::Requeue { next: 0 })]
    #[case::far_past_budget(i64::MAX, RetryDecision::Discard)]
    fn default_policy(#[case] retry: i64, #[case] expected: RetryDecision) {
        assert_eq!(RetryPolicy::default().decide(retry), expected);
    }

    #[test]
    fn zero_budget_throttles_immediately() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(
            policy.decide(0),
            RetryDecision::Throttle {
                delay: Duration::from_secs(1)
            }
        );
    }
}
