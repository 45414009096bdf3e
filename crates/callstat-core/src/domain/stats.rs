//! Per-phone call-attempt statistics.
//!
//! `PhoneStats` is the accumulator folded by the aggregation pass and the value stored in
//! the stats cache. It keeps raw totals; the averaged, externally visible form is
//! produced by [`crate::domain::ReportEntry`].

use serde::{Deserialize, Serialize};

use super::ids::Phone;

/// Price charged per second of call duration.
pub const PRICE_PER_SECOND: f64 = 10.0;

/// Only attempts strictly longer than this contribute to `total_price_over_threshold`.
pub const PRICE_THRESHOLD_SECS: f64 = 15.0;

const SHORT_BUCKET_MAX_SECS: f64 = 10.0;
const MEDIUM_BUCKET_MAX_SECS: f64 = 30.0;

/// One row of the records dataset.
///
/// Timestamps are epoch milliseconds. Extra fields in the dataset are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub phone: Phone,
    #[serde(rename = "start_date")]
    pub start_ms: i64,
    #[serde(rename = "end_date")]
    pub end_ms: i64,
}

impl CallRecord {
    pub fn duration_secs(&self) -> f64 {
        (self.end_ms as f64 - self.start_ms as f64) / 1000.0
    }
}

/// Attempt counts split by duration: `<= 10s`, `(10, 30]s`, `> 30s`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationBuckets {
    #[serde(rename = "10_sec")]
    pub up_to_10s: u64,
    #[serde(rename = "10_30_sec")]
    pub from_10_to_30s: u64,
    #[serde(rename = "30_sec")]
    pub over_30s: u64,
}

impl DurationBuckets {
    pub fn record(&mut self, duration_secs: f64) {
        if duration_secs <= SHORT_BUCKET_MAX_SECS {
            self.up_to_10s += 1;
        } else if duration_secs <= MEDIUM_BUCKET_MAX_SECS {
            self.from_10_to_30s += 1;
        } else {
            self.over_30s += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.up_to_10s + self.from_10_to_30s + self.over_30s
    }
}

/// Running statistics for one phone.
///
/// `min_price` / `max_price` start at `+inf` / `-inf` and stay there until the first
/// attempt is folded in. In the persisted snapshot the sentinels are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneStats {
    pub attempt_count: u64,
    pub duration_buckets: DurationBuckets,
    #[serde(
        serialize_with = "sentinel::serialize",
        deserialize_with = "sentinel::min_price"
    )]
    pub min_price: f64,
    #[serde(
        serialize_with = "sentinel::serialize",
        deserialize_with = "sentinel::max_price"
    )]
    pub max_price: f64,
    pub total_duration_seconds: f64,
    pub total_price_over_threshold: f64,
}

impl PhoneStats {
    pub fn new() -> Self {
        Self {
            attempt_count: 0,
            duration_buckets: DurationBuckets::default(),
            min_price: f64::INFINITY,
            max_price: f64::NEG_INFINITY,
            total_duration_seconds: 0.0,
            total_price_over_threshold: 0.0,
        }
    }

    /// Fold one dataset record into the running totals.
    pub fn record(&mut self, record: &CallRecord) {
        let duration = record.duration_secs();
        let price = duration * PRICE_PER_SECOND;

        self.attempt_count += 1;
        self.duration_buckets.record(duration);
        self.min_price = self.min_price.min(price);
        self.max_price = self.max_price.max(price);
        self.total_duration_seconds += duration;
        if duration > PRICE_THRESHOLD_SECS {
            self.total_price_over_threshold += price;
        }
    }

    pub fn has_attempts(&self) -> bool {
        self.attempt_count > 0
    }
}

impl Default for PhoneStats {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON has no infinities: sentinels travel as `null`.
mod sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn min_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }

    pub fn max_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
    }
}
