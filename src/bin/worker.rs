//! Worker binary: wires configuration, stores and the pool together.

use std::sync::Arc;

use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use belegwerk::config::Config;
use belegwerk::erp::pg::PgErpAdapter;
use belegwerk::persistence::PgMetadataStore;
use belegwerk::processor::Processor;
use belegwerk::storage::FsBlobStore;
use belegwerk::validation::semantic::SemanticValidator;
use belegwerk::worker::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    let config = Config::from_env()?;
    info!(
        concurrency = config.worker_concurrency,
        kosit = config.kosit.is_some(),
        "starting belegwerk worker"
    );

    let metadata_pool = PgPoolOptions::new()
        .max_connections(config.worker_concurrency as u32 + 2)
        .connect(&config.metadata_dsn)
        .await?;
    let store = Arc::new(PgMetadataStore::new(metadata_pool));

    let erp = Arc::new(
        PgErpAdapter::connect(&config.erp_dsn, config.worker_concurrency as u32).await?,
    );
    let blobs = Arc::new(FsBlobStore::new(config.blob_root.clone()));

    let semantic = SemanticValidator::new(config.kosit.clone(), config.kosit_timeout);
    let processor = Arc::new(Processor::new(
        store.clone(),
        blobs,
        erp,
        semantic,
        config.retry.clone(),
        config.monetary_tolerance,
        config.task_timeout,
    ));

    let pool = WorkerPool::new(
        processor,
        store,
        config.worker_concurrency,
        config.poll_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    pool.run(shutdown_rx).await;
    info!("belegwerk worker stopped");
    Ok(())
}
