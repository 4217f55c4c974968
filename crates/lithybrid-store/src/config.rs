//! Backend selection and connection.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use lithybrid_core::{defaults, Error, JobStore, Result};

use crate::memory::MemoryJobStore;
use crate::pool::{create_pool, PoolConfig};
use crate::postgres::PgJobStore;
use crate::redis_store::RedisJobStore;

/// Which job store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreBackend::Redis),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            "memory" | "mem" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!(
                "unknown JOB_STORE '{}', expected redis, postgres or memory",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreBackend::Redis => "redis",
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        })
    }
}

/// Job store configuration.
///
/// | Variable | Default |
/// |----------|---------|
/// | `JOB_STORE` | `redis` |
/// | `REDIS_URL` | `redis://localhost:6379` |
/// | `DATABASE_URL` | `postgres://localhost/lithybrid` |
/// | `JOB_RETENTION_SECS` | `604800` |
/// | `DB_MAX_CONNECTIONS` | `10` |
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub database_url: String,
    pub retention: Duration,
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Redis,
            redis_url: defaults::REDIS_URL.to_string(),
            database_url: defaults::DATABASE_URL.to_string(),
            retention: Duration::from_secs(defaults::JOB_RETENTION_SECS),
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Read the store configuration from the environment.
    ///
    /// Fails only on an unrecognised `JOB_STORE`.
    pub fn from_env() -> Result<Self> {
        let backend = match std::env::var("JOB_STORE") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => StoreBackend::Redis,
        };
        let retention_secs = std::env::var("JOB_RETENTION_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(defaults::JOB_RETENTION_SECS);

        Ok(Self {
            backend,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| defaults::REDIS_URL.to_string()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| defaults::DATABASE_URL.to_string()),
            retention: Duration::from_secs(retention_secs),
            pool: PoolConfig::from_env(),
        })
    }

    pub fn with_backend(mut self, backend: StoreBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

/// Open the configured job store. PostgreSQL migrations run on connect.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn JobStore>> {
    let store: Arc<dyn JobStore> = match config.backend {
        StoreBackend::Redis => {
            Arc::new(RedisJobStore::connect(&config.redis_url, config.retention).await?)
        }
        StoreBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.pool.clone()).await?;
            let store = PgJobStore::new(pool, config.retention);
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryJobStore::with_retention(config.retention)),
    };

    info!(
        subsystem = "store",
        backend = %config.backend,
        retention_secs = config.retention.as_secs(),
        "Job store ready"
    );
    Ok(store)
}
