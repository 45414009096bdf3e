use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::ids::{CorrelationId, Phone};

/// A report request as it arrives on the task queue.
///
/// The wire carries `phones` as a list; duplicates collapse here and the set keeps
/// report ordering deterministic (ascending phone). Unknown fields, including the
/// consumer-owned `retry` counter, are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub correlation_id: CorrelationId,
    pub phones: BTreeSet<Phone>,
}

impl Task {
    pub fn new(correlation_id: CorrelationId, phones: impl IntoIterator<Item = Phone>) -> Self {
        Self {
            correlation_id,
            phones: phones.into_iter().collect(),
        }
    }
}
