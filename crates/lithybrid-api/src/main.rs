//! lithybrid-api - HTTP API server for LitHybrid

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use lithybrid_api::{router, ApiConfig, AppState};
use lithybrid_core::logging::init_tracing;
use lithybrid_core::JobStore;
use lithybrid_jobs::{PipelineConfig, WorkerBuilder, WorkerConfig};
use lithybrid_sources::OpenAlexSource;
use lithybrid_store::{MemoryJobStore, StoreBackend, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_tracing(
        "lithybrid_api=debug,lithybrid_jobs=info,lithybrid_store=info,tower_http=debug",
        "lithybrid-api.log",
    );

    let config = ApiConfig::from_env();
    let store_config = StoreConfig::from_env().context("invalid store configuration")?;

    // The in-memory store only works with an in-process worker, which can
    // then be woken on submit instead of polling.
    let (store, notify): (Arc<dyn JobStore>, _) = match store_config.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryJobStore::with_retention(store_config.retention));
            let notify = store.job_notify();
            (store as Arc<dyn JobStore>, Some(notify))
        }
        _ => (
            lithybrid_store::connect(&store_config)
                .await
                .context("failed to connect to the job store")?,
            None,
        ),
    };

    info!(
        backend = %store_config.backend,
        rate_limit = config.rate_limit_enabled,
        rate_limit_requests = config.rate_limit_requests,
        rate_limit_period_secs = config.rate_limit_period.as_secs(),
        "Configuration loaded"
    );

    // Create and start job worker
    let worker = if config.run_worker {
        let source =
            Arc::new(OpenAlexSource::from_env().context("failed to create OpenAlex source")?);
        let mut builder = WorkerBuilder::new(store.clone(), source)
            .with_config(WorkerConfig::from_env())
            .with_pipeline_config(PipelineConfig::from_env());
        if let Some(notify) = notify {
            builder = builder.with_notify(notify);
        }
        let worker = builder.build();
        info!(worker_id = worker.worker_id(), "Starting in-process job worker");
        Some(worker.start())
    } else {
        if store_config.backend == StoreBackend::Memory {
            tracing::warn!("JOB_STORE=memory without WORKER_ENABLED: jobs will never run");
        }
        info!("Job worker disabled");
        None
    };

    let app = router(AppState::new(store, config.clone()));

    // Start server
    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(handle) = worker {
        info!("Stopping job worker");
        handle.stop().await;
    }
    Ok(())
}
