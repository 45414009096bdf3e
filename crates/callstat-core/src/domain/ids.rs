//! Domain identifiers.
//!
//! Phones are plain integers on the wire and in the dataset, so they stay a type alias.
//! The correlation id is opaque to this service: it is echoed back into the report as it
//! arrived, without being interpreted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phone number as it appears in tasks and dataset records.
pub type Phone = i64;

/// Caller-supplied identifier echoed into the report.
#[repr(transparent)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(serde_json::Number);

impl CorrelationId {
    pub fn new(value: impl Into<serde_json::Number>) -> Self {
        Self(value.into())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn large_correlation_ids_survive_json() {
        let id: CorrelationId = serde_json::from_str("13242421424214").unwrap();
        assert_eq!(id.to_string(), "13242421424214");
        assert_eq!(serde_json::to_string(&id).unwrap(), "13242421424214");
    }
}
