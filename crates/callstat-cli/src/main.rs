mod cli;
mod logging;
mod seed;
mod signals;

use anyhow::Context;
use callstat_core::app::{
    Aggregator, ReportPublisher, ReportService, ResilientConsumer, Shutdown, StatsCache,
};
use callstat_core::config::BrokerSettings;
use callstat_core::impls::{
    AmqpBroker, AmqpQueueSender, JsonArrayRecordSource, JsonFileSnapshotStore,
};
use callstat_core::ports::{Clock, SystemClock};
use clap::Parser as _;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{Instrument, error, info, warn};

use crate::cli::{Cli, Command, RunArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logging::init_logging()?;
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => {
            let span = logging::service_span(&args.environment);
            run(args).instrument(span).await
        }
        Command::Seed(args) => seed::seed(args).await,
    };
    if let Err(e) = &result {
        error!(error = %e, error_chain = ?e, "callstat exited with an error");
    }
    result
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    info!(?args, "Starting report service");
    let broker_settings = BrokerSettings::from(&args.broker);
    let cache_settings = args.cache_settings();
    let dataset_settings = args.dataset_settings();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = StatsCache::open(
        Arc::new(JsonFileSnapshotStore::new(&cache_settings.path)),
        Arc::clone(&clock),
        cache_settings.ttl,
    )
    .await;
    let service = ReportService::new(
        Arc::new(cache),
        Aggregator::new(Arc::new(JsonArrayRecordSource::new(&dataset_settings.path))),
        ReportPublisher::new(Arc::new(AmqpQueueSender::for_reports(&broker_settings))),
        clock,
    );

    let broker = AmqpBroker::connect(&broker_settings)
        .await
        .context("failed to connect to the broker")?;
    let deliveries = broker.deliveries().await?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()).in_current_span());

    let consumer = ResilientConsumer::new(Arc::new(service), shutdown)
        .prefetch(usize::from(broker_settings.prefetch));
    let result = consumer
        .run(deliveries, Arc::new(broker.republisher()))
        .await;

    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }
    info!(counts = ?consumer.counts(), "Report service stopped");
    result.context("consumer stopped")
}
