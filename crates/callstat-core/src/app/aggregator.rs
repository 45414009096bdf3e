//! Aggregator - one streaming pass over the dataset for a set of phones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

use crate::domain::{Phone, PhoneStats};
use crate::ports::{RecordSource, RecordSourceError};

pub struct Aggregator {
    source: Arc<dyn RecordSource>,
    scans: AtomicU64,
}

impl Aggregator {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self {
            source,
            scans: AtomicU64::new(0),
        }
    }

    /// Stats for every phone in `phones`, including phones with no records at all.
    ///
    /// The scan is blocking and runs on tokio's blocking pool.
    pub async fn aggregate(
        &self,
        phones: &BTreeSet<Phone>,
    ) -> Result<BTreeMap<Phone, PhoneStats>, RecordSourceError> {
        let source = Arc::clone(&self.source);
        let wanted = phones.clone();
        let started = Instant::now();

        let results =
            tokio::task::spawn_blocking(move || scan(source.as_ref(), wanted)).await??;

        self.scans.fetch_add(1, Ordering::Relaxed);
        debug!(
            phones = phones.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dataset scanned"
        );
        Ok(results)
    }

    /// Completed dataset scans since construction.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }
}

fn scan(
    source: &dyn RecordSource,
    wanted: BTreeSet<Phone>,
) -> Result<BTreeMap<Phone, PhoneStats>, RecordSourceError> {
    let mut results: BTreeMap<Phone, PhoneStats> = wanted
        .into_iter()
        .map(|phone| (phone, PhoneStats::new()))
        .collect();
    source.scan(&mut |record| {
        if let Some(stats) = results.get_mut(&record.phone) {
            stats.record(&record);
        }
    })?;
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallRecord, ReportEntry};
    use crate::impls::{InMemoryRecordSource, JsonArrayRecordSource};

    fn call(phone: Phone, secs: i64) -> CallRecord {
        CallRecord {
            phone,
            start_ms: 1_000_000,
            end_ms: 1_000_000 + secs * 1000,
        }
    }

    fn aggregator(records: Vec<CallRecord>) -> Aggregator {
        Aggregator::new(Arc::new(InMemoryRecordSource::new(records)))
    }

    #[tokio::test]
    async fn aggregates_only_requested_phones() {
        let agg = aggregator(vec![call(1, 5), call(2, 20), call(1, 40), call(3, 1)]);
        let results = agg.aggregate(&BTreeSet::from([1, 2, 9])).await.unwrap();

        assert_eq!(results.keys().copied().collect::<Vec<_>>(), vec![1, 2, 9]);
        assert_eq!(results[&1].attempt_count, 2);
        assert_eq!(results[&1].total_duration_seconds, 45.0);
        assert_eq!(results[&1].total_price_over_threshold, 400.0);
        assert_eq!(results[&2].attempt_count, 1);
        assert!(!results[&9].has_attempts());
        assert_eq!(agg.scan_count(), 1);
    }

    #[tokio::test]
    async fn aggregating_twice_is_idempotent() {
        let agg = aggregator(vec![call(7, 3), call(7, 12), call(7, 31)]);
        let phones = BTreeSet::from([7]);

        let first = agg.aggregate(&phones).await.unwrap();
        let second = agg.aggregate(&phones).await.unwrap();

        assert_eq!(
            ReportEntry::format_all(&first),
            ReportEntry::format_all(&second)
        );
        assert_eq!(agg.scan_count(), 2);
    }

    #[tokio::test]
    async fn missing_dataset_is_an_error_and_not_counted() {
        let agg = Aggregator::new(Arc::new(JsonArrayRecordSource::new(
            "/nonexistent/callstat/data.json",
        )));
        let err = agg.aggregate(&BTreeSet::from([1])).await.unwrap_err();

        assert!(matches!(err, RecordSourceError::Open { .. }));
        assert_eq!(agg.scan_count(), 0);
    }
}
