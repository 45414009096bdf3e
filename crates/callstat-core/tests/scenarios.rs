//! End-to-end runs of the consumer and report service over in-memory adapters.

use callstat_core::app::{
    Aggregator, ReportPublisher, ReportService, ResilientConsumer, Shutdown, StatsCache,
};
use callstat_core::domain::{CallRecord, CorrelationId, Task};
use callstat_core::impls::{
    InMemoryBroker, InMemoryQueueSender, InMemoryRecordSource, InMemorySnapshotStore,
    JsonArrayRecordSource, JsonFileSnapshotStore,
};
use callstat_core::ports::{Clock, FixedClock, RecordSource, Republisher, SnapshotStore};
use chrono::{DateTime, TimeDelta};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

const TTL: Duration = Duration::from_secs(600);

fn call(phone: i64, secs: i64) -> CallRecord {
    CallRecord {
        phone,
        start_ms: 1_684_000_000_000,
        end_ms: 1_684_000_000_000 + secs * 1000,
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    ))
}

async fn service(
    source: Arc<dyn RecordSource>,
    store: Arc<dyn SnapshotStore>,
    sender: Arc<InMemoryQueueSender>,
    clock: Arc<dyn Clock>,
) -> ReportService {
    let cache = StatsCache::open(store, Arc::clone(&clock), TTL).await;
    ReportService::new(
        Arc::new(cache),
        Aggregator::new(source),
        ReportPublisher::new(sender),
        clock,
    )
}

/// Run the consumer until `done` holds, then shut it down and wait for it.
async fn consume_until(
    broker: &InMemoryBroker,
    consumer: Arc<ResilientConsumer<ReportService>>,
    shutdown: &Shutdown,
    done: impl Fn() -> bool,
) {
    let deliveries = broker.deliveries().unwrap();
    let republisher: Arc<dyn Republisher> = Arc::new(broker.clone());
    let run = tokio::spawn(async move { consumer.run(deliveries, republisher).await });

    tokio::time::timeout(Duration::from_secs(3600), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("condition not reached");

    shutdown.trigger();
    run.await.unwrap().unwrap();
}

fn scenario_a_records() -> Vec<CallRecord> {
    vec![call(1, 5), call(3, 12), call(1, 20), call(1, 40)]
}

#[tokio::test]
async fn scenario_a_report_over_the_queue() {
    let broker = InMemoryBroker::new();
    let sender = Arc::new(InMemoryQueueSender::new());
    let svc = service(
        Arc::new(InMemoryRecordSource::new(scenario_a_records())),
        Arc::new(InMemorySnapshotStore::new()),
        Arc::clone(&sender),
        clock(),
    )
    .await;
    let shutdown = Shutdown::new();
    let consumer = Arc::new(ResilientConsumer::new(Arc::new(svc), shutdown.clone()));

    broker
        .push("task_report", br#"{"correlation_id": 1, "phones": [1, 2]}"#.to_vec())
        .unwrap();
    consume_until(&broker, Arc::clone(&consumer), &shutdown, || {
        !sender.sent().is_empty() && broker.acked().len() == 1
    })
    .await;

    let report: Value = serde_json::from_slice(&sender.sent()[0]).unwrap();
    assert_eq!(report["correlation_id"], 1);
    assert_eq!(report["status"], "Complete");
    assert_eq!(report["task_received"], "2023-11-14 22:13:20.000000");
    assert_eq!(report["from"], "report_service");
    assert_eq!(report["to"], "client");
    assert!(report["total_duration"].as_f64().unwrap() >= 0.0);
    assert_eq!(
        report["data"],
        json!([{
            "phone": 1,
            "cnt_all_attempts": 3,
            "cnt_att_dur": {"10_sec": 1, "10_30_sec": 1, "30_sec": 1},
            "min_price_att": 50.0,
            "max_price_att": 400.0,
            "avg_dur_att": 65.0 / 3.0,
            "sum_price_att_over_15": 600.0
        }])
    );

    let counts = consumer.counts();
    assert_eq!(counts.received, 1);
    assert_eq!(counts.acked, 1);
    assert_eq!(counts.requeued, 0);
}

#[tokio::test]
async fn scenario_b_replay_is_served_from_cache() {
    let sender = Arc::new(InMemoryQueueSender::new());
    let svc = service(
        Arc::new(InMemoryRecordSource::new(scenario_a_records())),
        Arc::new(InMemorySnapshotStore::new()),
        sender,
        clock(),
    )
    .await;
    let task = Task::new(CorrelationId::new(1), [1, 2]);

    let first = svc.build_report(&task).await.unwrap();
    assert_eq!(svc.aggregator().scan_count(), 1);

    let replay = svc.build_report(&task).await.unwrap();
    assert_eq!(svc.aggregator().scan_count(), 1);
    assert_eq!(replay.results, first.results);
}

#[tokio::test]
async fn expired_cache_triggers_a_new_scan() {
    let clock = clock();
    let svc = service(
        Arc::new(InMemoryRecordSource::new(scenario_a_records())),
        Arc::new(InMemorySnapshotStore::new()),
        Arc::new(InMemoryQueueSender::new()),
        clock.clone(),
    )
    .await;
    let task = Task::new(CorrelationId::new(1), [1]);

    svc.build_report(&task).await.unwrap();
    clock.advance(TimeDelta::seconds(601));
    svc.build_report(&task).await.unwrap();

    assert_eq!(svc.aggregator().scan_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failing_task_walks_retries_then_is_throttled_and_dropped() {
    let broker = InMemoryBroker::new();
    let sender = Arc::new(InMemoryQueueSender::new());
    let svc = service(
        Arc::new(JsonArrayRecordSource::new("/nonexistent/callstat/data.json")),
        Arc::new(InMemorySnapshotStore::new()),
        Arc::clone(&sender),
        clock(),
    )
    .await;
    let shutdown = Shutdown::new();
    let consumer = Arc::new(ResilientConsumer::new(Arc::new(svc), shutdown.clone()));

    broker
        .push("task_report", br#"{"correlation_id": 77, "phones": [1]}"#.to_vec())
        .unwrap();
    let started = tokio::time::Instant::now();
    consume_until(&broker, Arc::clone(&consumer), &shutdown, || {
        broker.acked().len() == 6
    })
    .await;

    let retries: Vec<u64> = broker
        .republished()
        .iter()
        .map(|(key, body)| {
            assert_eq!(key, "task_report");
            let body: Value = serde_json::from_slice(body).unwrap();
            assert_eq!(body["correlation_id"], 77);
            body["retry"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(retries, vec![1, 2, 3, 4, 5]);

    let counts = consumer.counts();
    assert_eq!(counts.received, 6);
    assert_eq!(counts.requeued, 5);
    assert_eq!(counts.throttled, 1);
    assert!(started.elapsed() >= Duration::from_secs(600));
    assert!(sender.sent().is_empty());
}

#[tokio::test]
async fn cache_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("cache.json");
    let clock = clock();

    let first = service(
        Arc::new(InMemoryRecordSource::new(scenario_a_records())),
        Arc::new(JsonFileSnapshotStore::new(&snapshot)),
        Arc::new(InMemoryQueueSender::new()),
        clock.clone(),
    )
    .await;
    let task = Task::new(CorrelationId::new(5), [1, 2]);
    let before = first.build_report(&task).await.unwrap();
    drop(first);

    clock.advance(TimeDelta::seconds(60));
    let restarted = service(
        Arc::new(InMemoryRecordSource::new(Vec::new())),
        Arc::new(JsonFileSnapshotStore::new(&snapshot)),
        Arc::new(InMemoryQueueSender::new()),
        clock,
    )
    .await;
    let after = restarted.build_report(&task).await.unwrap();

    assert_eq!(restarted.aggregator().scan_count(), 0);
    assert_eq!(after.results, before.results);
}
