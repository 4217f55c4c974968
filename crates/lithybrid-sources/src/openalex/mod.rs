//! OpenAlex adapter.
//!
//! Searches `/works` by title, pages until the requested number of works is
//! collected or the provider runs out, and normalizes each work into a
//! [`lithybrid_core::CandidatePaper`].

mod client;
pub mod error;
pub mod types;

pub use client::{OpenAlexConfig, OpenAlexSource};
pub use error::OpenAlexErrorCode;
