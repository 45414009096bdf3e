//! Report model: the completion message published for a task.

use serde::{Deserialize, Serialize};

use super::ids::{CorrelationId, Phone};
use super::stats::{DurationBuckets, PhoneStats};
use super::task::Task;

pub const REPORT_SOURCE: &str = "report_service";
pub const REPORT_DESTINATION: &str = "client";

/// Format used for `task_received` (UTC, microsecond precision).
pub const TASK_RECEIVED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Complete,
}

/// Externally visible statistics for one phone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub phone: Phone,
    pub cnt_all_attempts: u64,
    pub cnt_att_dur: DurationBuckets,
    pub min_price_att: f64,
    pub max_price_att: f64,
    pub avg_dur_att: f64,
    pub sum_price_att_over_15: f64,
}

impl ReportEntry {
    /// Format accumulated stats for emission.
    ///
    /// Returns `None` for phones without attempts: they are dropped from the report,
    /// never zero-filled.
    pub fn from_stats(phone: Phone, stats: &PhoneStats) -> Option<Self> {
        if !stats.has_attempts() {
            return None;
        }
        Some(Self {
            phone,
            cnt_all_attempts: stats.attempt_count,
            cnt_att_dur: stats.duration_buckets,
            min_price_att: finite_or_zero(stats.min_price),
            max_price_att: finite_or_zero(stats.max_price),
            avg_dur_att: stats.total_duration_seconds / stats.attempt_count as f64,
            sum_price_att_over_15: stats.total_price_over_threshold,
        })
    }

    /// Format a whole result set, in iteration order, dropping empty phones.
    pub fn format_all<'a>(
        results: impl IntoIterator<Item = (&'a Phone, &'a PhoneStats)>,
    ) -> Vec<Self> {
        results
            .into_iter()
            .filter_map(|(phone, stats)| Self::from_stats(*phone, stats))
            .collect()
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// The completion report published to the report queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub correlation_id: CorrelationId,
    pub status: ReportStatus,
    #[serde(rename = "task_received")]
    pub task_received_time: String,
    #[serde(rename = "from")]
    pub source: String,
    #[serde(rename = "to")]
    pub destination: String,
    #[serde(rename = "data")]
    pub results: Vec<ReportEntry>,
    #[serde(rename = "total_duration")]
    pub total_duration_seconds: f64,
}

impl Report {
    /// Assemble the envelope. Pure: no I/O, no failure modes.
    pub fn build(
        task: &Task,
        task_received_time: impl Into<String>,
        results: Vec<ReportEntry>,
        elapsed_seconds: f64,
    ) -> Self {
        Self {
            correlation_id: task.correlation_id.clone(),
            status: ReportStatus::Complete,
            task_received_time: task_received_time.into(),
            source: REPORT_SOURCE.to_string(),
            destination: REPORT_DESTINATION.to_string(),
            results,
            total_duration_seconds: elapsed_seconds,
        }
    }
}
