//! RetryEnvelope - the raw message body plus the consumer-owned `retry` counter.
//!
//! Only the consumer reads or bumps the counter. Handlers receive the decoded task,
//! never the envelope.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const RETRY_FIELD: &str = "retry";

/// A JSON-object message body.
///
/// All fields are kept verbatim so a requeued message carries exactly what arrived,
/// except for `retry`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryEnvelope {
    body: Map<String, Value>,
}

impl RetryEnvelope {
    /// Parse a raw body. Anything other than a JSON object is rejected.
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        let body = serde_json::from_slice::<Map<String, Value>>(raw)?;
        Ok(Self { body })
    }

    /// Current retry counter, signed as it arrived. Absent or non-integer values count
    /// as 0; integers beyond `i64` saturate.
    pub fn retry(&self) -> i64 {
        match self.body.get(RETRY_FIELD) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|_| i64::MAX))
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Raw value of a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.body.get(field)
    }

    /// Copy of this envelope carrying the given retry counter.
    pub fn with_retry(&self, retry: i64) -> Self {
        let mut body = self.body.clone();
        body.insert(RETRY_FIELD.to_string(), Value::from(retry));
        Self { body }
    }

    /// Decode the business payload.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.body.clone()))
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.body)
    }
}
