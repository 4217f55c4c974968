//! # lithybrid-store
//!
//! Job store backends for LitHybrid.
//!
//! Three implementations of [`lithybrid_core::JobStore`]:
//! - [`RedisJobStore`]: hash per job, Lua compare-and-swap, list queue
//! - [`PgJobStore`]: JSONB rows, `UPDATE ... WHERE revision = $n`, `SKIP LOCKED` claims
//! - [`MemoryJobStore`]: single mutex, for tests and single-process runs
//!
//! [`connect`] picks one from [`StoreConfig`].

pub mod config;
pub mod memory;
pub mod pool;
pub mod postgres;
pub mod redis_store;

pub use config::{connect, StoreBackend, StoreConfig};
pub use memory::MemoryJobStore;
pub use pool::{create_pool, PoolConfig};
pub use postgres::PgJobStore;
pub use redis_store::{KeySpace, RedisJobStore};
