use anyhow::Context;
use callstat_core::impls::AmqpQueueSender;
use callstat_core::ports::QueueSender;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::cli::SeedArgs;

/// Ten overlapping tasks, enough to exercise both cache hits and misses.
pub fn sample_messages() -> Vec<Value> {
    vec![
        json!({"correlation_id": 13242421424214_u64, "phones": [1, 2, 3, 3, 5, 11, 67, 45, 23, 33]}),
        json!({"correlation_id": 13242421424215_u64, "phones": [4, 5, 6, 4, 99, 98, 97, 56, 45, 45]}),
        json!({"correlation_id": 13242421424216_u64, "phones": [7, 8, 9, 10, 11, 12, 13, 14, 15, 16]}),
        json!({"correlation_id": 13242421424217_u64, "phones": [17, 18, 19, 20, 21, 22, 23, 24, 25, 36]}),
        json!({"correlation_id": 13242421424218_u64, "phones": [37, 38, 39, 10, 11, 32, 13, 45, 15, 16]}),
        json!({"correlation_id": 13242421424219_u64, "phones": [7, 1, 0, 10, 76, 8, 78, 15, 1, 11]}),
        json!({"correlation_id": 13242421424220_u64, "phones": [83, 81, 91, 11, 51, 44, 7, 15, 25, 76]}),
        json!({"correlation_id": 13242421424221_u64, "phones": [0, 58, 59, 50, 51, 52, 53, 54, 55, 36]}),
        json!({"correlation_id": 13242421424222_u64, "phones": [70, 82, 9, 3, 11, 12, 2, 75, 87, 90]}),
        json!({"correlation_id": 13242421424223_u64, "phones": [66, 8, 99, 55, 33, 44, 66, 77, 43, 39]}),
    ]
}

fn load_messages(args: &SeedArgs) -> anyhow::Result<Vec<Value>> {
    let Some(path) = &args.file else {
        return Ok(sample_messages());
    };
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a JSON array of messages", path.display()))
}

/// Publish task messages to the task queue through the default exchange.
pub async fn seed(args: SeedArgs) -> anyhow::Result<()> {
    let messages = load_messages(&args)?;
    let sender = AmqpQueueSender::new(
        args.broker.dsn.clone(),
        args.broker.task_queue.clone(),
        args.broker.task_queue.clone(),
        Duration::from_secs(args.broker.connect_timeout_secs),
    );

    for message in &messages {
        let body = serde_json::to_vec(message)?;
        sender
            .send(&body)
            .await
            .with_context(|| format!("failed to send {message}"))?;
        info!(%message, "Message sent");
    }
    info!(count = messages.len(), queue = %args.broker.task_queue, "Seeding finished");
    Ok(())
}
