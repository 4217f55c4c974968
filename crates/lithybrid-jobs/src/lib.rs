//! # lithybrid-jobs
//!
//! Pipeline executor and background worker for LitHybrid.
//!
//! This crate provides:
//! - The pipeline that takes a claimed job through retrieval, ranking,
//!   composition and completion
//! - A worker that claims queued jobs and runs several concurrently
//! - A reaper that fails jobs abandoned by crashed workers
//! - Progress and lifecycle notifications via a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use lithybrid_jobs::{WorkerBuilder, WorkerConfig};
//! use lithybrid_sources::OpenAlexSource;
//! use lithybrid_store::{connect, StoreConfig};
//!
//! let store = connect(&StoreConfig::from_env()?).await?;
//! let source = Arc::new(OpenAlexSource::from_env()?);
//!
//! let worker = WorkerBuilder::new(store, source)
//!     .with_config(WorkerConfig::default().with_max_concurrent(8))
//!     .build();
//!
//! let handle = worker.start();
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! // Graceful shutdown
//! handle.stop().await;
//! ```

pub mod compose;
pub mod pipeline;
pub mod rank;
pub mod reaper;
pub mod retry;
pub mod worker;

pub use compose::{extract_snippet, ComposeError, SummaryComposer};
pub use pipeline::{PipelineConfig, PipelineExecutor, ProgressCallback, RunOutcome};
pub use rank::rank;
pub use reaper::{Reaper, SweepReport};
pub use retry::Backoff;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
