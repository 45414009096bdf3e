//! ReportService - cache, aggregation and publishing for one task.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use super::aggregator::Aggregator;
use super::handler::MessageHandler;
use super::publisher::{PublishError, ReportPublisher};
use super::stats_cache::StatsCache;
use crate::domain::{HandleError, Report, ReportEntry, TASK_RECEIVED_FORMAT, Task};
use crate::ports::{Clock, RecordSourceError};

impl From<RecordSourceError> for HandleError {
    fn from(e: RecordSourceError) -> Self {
        HandleError::retryable("failed to aggregate call records").with_source(e)
    }
}

impl From<PublishError> for HandleError {
    fn from(e: PublishError) -> Self {
        HandleError::retryable("failed to publish report").with_source(e)
    }
}

pub struct ReportService {
    cache: Arc<StatsCache>,
    aggregator: Aggregator,
    publisher: ReportPublisher,
    clock: Arc<dyn Clock>,
}

impl ReportService {
    pub fn new(
        cache: Arc<StatsCache>,
        aggregator: Aggregator,
        publisher: ReportPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            aggregator,
            publisher,
            clock,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn cache(&self) -> &StatsCache {
        &self.cache
    }

    /// Build the report for `task` without publishing it.
    ///
    /// Cached phones are taken as-is; the rest come from one dataset scan and are
    /// written back to the cache, zero-result phones included.
    pub async fn build_report(&self, task: &Task) -> Result<Report, HandleError> {
        let task_received = self.clock.now().format(TASK_RECEIVED_FORMAT).to_string();
        let started = Instant::now();

        let mut results = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for &phone in &task.phones {
            match self.cache.get(phone).await {
                Some(stats) => {
                    results.insert(phone, stats);
                }
                None => {
                    missing.insert(phone);
                }
            }
        }
        debug!(
            cached = results.len(),
            missing = missing.len(),
            "Cache lookup finished"
        );

        if !missing.is_empty() {
            let fresh = self.aggregator.aggregate(&missing).await?;
            self.cache
                .save_all(fresh.iter().map(|(phone, stats)| (*phone, stats.clone())))
                .await;
            results.extend(fresh);
        }

        let entries = ReportEntry::format_all(&results);
        let elapsed = started.elapsed().as_secs_f64();
        Ok(Report::build(task, task_received, entries, elapsed))
    }
}

#[async_trait]
impl MessageHandler for ReportService {
    type Task = Task;
    type Output = Report;

    async fn handle(&self, task: Task) -> Result<Report, HandleError> {
        let report = self.build_report(&task).await?;
        self.publisher.publish(&report).await?;
        Ok(report)
    }
}
