//! Standalone LitHybrid worker process.
//!
//! Any number of these may run against the same store.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use lithybrid_core::logging::init_tracing;
use lithybrid_jobs::{PipelineConfig, WorkerBuilder, WorkerConfig};
use lithybrid_sources::OpenAlexSource;
use lithybrid_store::StoreConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing(
        "lithybrid_jobs=info,lithybrid_store=info,lithybrid_sources=info",
        "lithybrid-worker.log",
    );

    let store_config = StoreConfig::from_env().context("invalid store configuration")?;
    let store = lithybrid_store::connect(&store_config)
        .await
        .context("failed to connect to the job store")?;
    let source = Arc::new(OpenAlexSource::from_env().context("failed to create OpenAlex source")?);

    let worker = WorkerBuilder::new(store, source)
        .with_config(WorkerConfig::from_env())
        .with_pipeline_config(PipelineConfig::from_env())
        .build();
    info!(
        worker_id = worker.worker_id(),
        backend = %store_config.backend,
        "Starting LitHybrid worker"
    );

    let handle = worker.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested, finishing in-flight jobs");
    handle.stop().await;
    Ok(())
}
