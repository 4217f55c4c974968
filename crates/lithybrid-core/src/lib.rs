//! # lithybrid-core
//!
//! Core types, traits, and abstractions for LitHybrid.
//!
//! This crate provides the job model and its state machine, the store and
//! paper source traits, APA formatting, and the shared defaults and logging
//! schema that the other LitHybrid crates depend on.

pub mod citation;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use citation::{format_apa, format_authors, render_bibliography};
pub use error::{Error, Result, SourceError};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7, parse_job_id};
