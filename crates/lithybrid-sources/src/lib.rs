//! # lithybrid-sources
//!
//! Bibliographic paper source adapters for LitHybrid.
//!
//! Implements [`lithybrid_core::PaperSource`] for OpenAlex and, behind the
//! `mock` feature, a scriptable mock for tests.

pub mod openalex;

#[cfg(feature = "mock")]
pub mod mock;

pub use openalex::{OpenAlexConfig, OpenAlexSource};

#[cfg(feature = "mock")]
pub use mock::MockPaperSource;
