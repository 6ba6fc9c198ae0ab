use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, error, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_monitoring::{
    aggregator::Aggregator,
    cache::{EphemeralStore, MemoryCache},
    checker::Checker,
    config::{StorageConfig, read_config_file},
    mailer::Mailer,
    queue::{MemoryQueue, MessageQueue},
    scheduler::Scheduler,
    store::{MonitorStore, sqlite::SqliteStore},
    util,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("uptime_monitoring", LevelFilter::TRACE),
        ("hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    dotenv::dotenv().ok();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let db_path = match config.storage.clone().unwrap_or_default() {
        StorageConfig::Sqlite { path } => util::get_database_path()
            .map(Into::into)
            .unwrap_or(path),
    };

    let store: Arc<dyn MonitorStore> = Arc::new(SqliteStore::new(&db_path).await?);
    let cache: Arc<dyn EphemeralStore> = Arc::new(MemoryCache::new());
    let queue: Arc<dyn MessageQueue> = Arc::new(MemoryQueue::new());
    let mailer = Mailer::new(&config.mail, util::get_mail_api_key());

    if util::get_mail_api_key().is_none() {
        debug!("no mail API key configured, alert mail will likely be rejected");
    }

    let scheduler = Scheduler::new(store.clone(), queue.clone(), config.scheduler.clone());
    let checker = Checker::new(queue.clone(), cache.clone(), config.checker.clone());
    let aggregator = Aggregator::new(
        store.clone(),
        cache.clone(),
        mailer,
        config.aggregator.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let handles = vec![
        tokio::spawn(scheduler.run(shutdown_tx.subscribe())),
        tokio::spawn(checker.run(shutdown_tx.subscribe())),
        tokio::spawn(aggregator.run(shutdown_tx.subscribe())),
    ];

    tokio::signal::ctrl_c().await?;
    debug!("shutting down");

    let _ = shutdown_tx.send(());
    for handle in handles {
        if let Err(e) = handle.await {
            error!("{e}");
        }
    }

    store.close().await?;

    Ok(())
}
