//! PostgreSQL job store.
//!
//! The job is stored as JSONB in `doc`, with `state`, `revision` and the
//! timestamps mirrored into columns for the claim, reaper and expiry queries.
//! Claims lock the oldest pending row with `FOR UPDATE SKIP LOCKED` so any
//! number of workers can poll the same table.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use lithybrid_core::{Error, Job, JobOutput, JobStore, Result};

/// PostgreSQL implementation of [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
    retention: chrono::Duration,
}

impl PgJobStore {
    pub fn new(pool: PgPool, retention: Duration) -> Self {
        Self {
            pool,
            retention: chrono::Duration::from_std(retention)
                .unwrap_or_else(|_| chrono::Duration::days(7)),
        }
    }

    /// Run the bundled schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("migration failed: {}", e)))?;
        info!(subsystem = "store", component = "postgres", "Migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn parse_doc(row: &sqlx::postgres::PgRow, column: &str) -> Result<Job> {
        let Json(job): Json<Job> = row.try_get(column)?;
        Ok(job)
    }

    async fn swap_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        expected_revision: u64,
        job: &Job,
        output: Option<&JobOutput>,
    ) -> Result<bool> {
        let expires_at = Utc::now() + self.retention;
        let result = sqlx::query(
            "UPDATE lithybrid_jobs
             SET state = $3, revision = $4, doc = $5, updated_at = $6, expires_at = $7,
                 output = COALESCE($8, output)
             WHERE id = $1 AND revision = $2 AND expires_at > now()",
        )
        .bind(job.id)
        .bind(expected_revision as i64)
        .bind(job.state.as_str())
        .bind(job.revision as i64)
        .bind(Json(job))
        .bind(job.updated_at)
        .bind(expires_at)
        .bind(output.map(Json))
        .execute(&mut **tx)
        .await?;

        let swapped = result.rows_affected() == 1;
        if !swapped {
            debug!(job_id = %job.id, expected_revision, "CAS conflict");
        }
        Ok(swapped)
    }

    async fn swap(
        &self,
        expected_revision: u64,
        job: &Job,
        output: Option<&JobOutput>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let swapped = self.swap_in(&mut tx, expected_revision, job, output).await?;
        tx.commit().await?;
        Ok(swapped)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn create(&self, job: &Job) -> Result<()> {
        let expires_at = Utc::now() + self.retention;
        let result = sqlx::query(
            "INSERT INTO lithybrid_jobs (id, state, revision, doc, created_at, updated_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(job.id)
        .bind(job.state.as_str())
        .bind(job.revision as i64)
        .bind(Json(job))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Store(format!("job {} already exists", job.id)));
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT doc FROM lithybrid_jobs WHERE id = $1 AND expires_at > now()",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::parse_doc(&r, "doc")).transpose()
    }

    async fn get_output(&self, job_id: Uuid) -> Result<Option<JobOutput>> {
        let row = sqlx::query(
            "SELECT output FROM lithybrid_jobs WHERE id = $1 AND expires_at > now()",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let output: Option<Json<JobOutput>> = row.try_get("output")?;
        Ok(output.map(|Json(o)| o))
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &Job) -> Result<bool> {
        self.swap(expected_revision, job, None).await
    }

    async fn complete(
        &self,
        expected_revision: u64,
        job: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        self.swap(expected_revision, job, Some(output)).await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        // SKIP LOCKED lets concurrent workers each take a different row.
        let row = sqlx::query(
            "SELECT doc FROM lithybrid_jobs
             WHERE state = 'PENDING' AND expires_at > now()
             ORDER BY created_at ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let job = Self::parse_doc(&row, "doc")?;
        let claimed = job.claimed(worker_id)?;
        if !self.swap_in(&mut tx, job.revision, &claimed, None).await? {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(claimed))
    }

    async fn list_active(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT doc FROM lithybrid_jobs
             WHERE state IN ('RETRIEVING', 'COMPOSING') AND expires_at > now()
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|r| Self::parse_doc(r, "doc")).collect()
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lithybrid_jobs WHERE state = 'PENDING' AND expires_at > now()",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lithybrid_jobs WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
