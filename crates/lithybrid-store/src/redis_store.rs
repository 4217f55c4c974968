//! Redis job store.
//!
//! ## Key layout
//!
//! | Key | Type | Content |
//! |-----|------|---------|
//! | `{prefix}:job:{id}` | hash | `rev`, `state`, `doc` (job JSON) |
//! | `{prefix}:job:{id}:output` | string | output JSON, written with `DONE` |
//! | `{prefix}:queue` | list | ids waiting to be claimed (FIFO) |
//! | `{prefix}:active` | set | ids in `RETRIEVING` / `COMPOSING` |
//!
//! Every write refreshes the retention TTL on the job keys. Writes to an
//! existing job are Lua scripts that compare `rev` first, so they are atomic
//! with respect to other writers.
//!
//! A queued id is only removed by the same script that moves its job out of
//! `PENDING`. Claiming peeks at the head of the queue and never pops first, so
//! a claimer that fails between the two steps leaves the job queued.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};
use uuid::Uuid;

use lithybrid_core::{defaults, Error, Job, JobOutput, JobStore, Result};

/// Insert a new job and enqueue it, unless the key already exists.
///
/// KEYS: job, queue. ARGV: rev, state, doc, ttl, id.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'rev', ARGV[1], 'state', ARGV[2], 'doc', ARGV[3])
redis.call('EXPIRE', KEYS[1], ARGV[4])
redis.call('RPUSH', KEYS[2], ARGV[5])
return 1
"#;

/// Compare-and-swap a job record, optionally writing its output.
///
/// KEYS: job, output, active, queue.
/// ARGV: expected rev, new rev, state, doc, ttl, id, terminal flag, output.
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'rev')
if not current or tonumber(current) ~= tonumber(ARGV[1]) then
  return 0
end
local prev = redis.call('HGET', KEYS[1], 'state')
if prev == 'PENDING' and ARGV[3] ~= 'PENDING' then
  redis.call('LREM', KEYS[4], 0, ARGV[6])
end
redis.call('HSET', KEYS[1], 'rev', ARGV[2], 'state', ARGV[3], 'doc', ARGV[4])
redis.call('EXPIRE', KEYS[1], ARGV[5])
if ARGV[8] ~= '' then
  redis.call('SET', KEYS[2], ARGV[8], 'EX', ARGV[5])
end
if ARGV[7] == '1' then
  redis.call('SREM', KEYS[3], ARGV[6])
elseif ARGV[3] ~= 'PENDING' then
  redis.call('SADD', KEYS[3], ARGV[6])
end
return 1
"#;

/// Key builder for one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(defaults::REDIS_KEY_PREFIX)
    }
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn job(&self, job_id: Uuid) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    pub fn output(&self, job_id: Uuid) -> String {
        format!("{}:job:{}:output", self.prefix, job_id)
    }

    pub fn queue(&self) -> String {
        format!("{}:queue", self.prefix)
    }

    pub fn active(&self) -> String {
        format!("{}:active", self.prefix)
    }
}

/// Redis implementation of [`JobStore`].
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    keys: KeySpace,
    ttl_secs: u64,
    create_script: Script,
    cas_script: Script,
}

impl RedisJobStore {
    /// Connect with the default key prefix.
    pub async fn connect(redis_url: &str, retention: Duration) -> Result<Self> {
        Self::connect_with_keys(redis_url, retention, KeySpace::default()).await
    }

    /// Connect using a custom key namespace.
    pub async fn connect_with_keys(
        redis_url: &str,
        retention: Duration,
        keys: KeySpace,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(
            subsystem = "store",
            component = "redis",
            // mask credentials
            url = %redis_url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
            ttl_secs = retention.as_secs(),
            "Redis job store connected"
        );
        Ok(Self {
            conn,
            keys,
            ttl_secs: retention.as_secs().max(1),
            create_script: Script::new(CREATE_SCRIPT),
            cas_script: Script::new(CAS_SCRIPT),
        })
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    async fn write(
        &self,
        expected_revision: u64,
        job: &Job,
        output: Option<&JobOutput>,
    ) -> Result<bool> {
        let doc = serde_json::to_string(job)?;
        let output = match output {
            Some(o) => serde_json::to_string(o)?,
            None => String::new(),
        };
        let mut conn = self.conn.clone();
        let swapped: i32 = self
            .cas_script
            .key(self.keys.job(job.id))
            .key(self.keys.output(job.id))
            .key(self.keys.active())
            .key(self.keys.queue())
            .arg(expected_revision)
            .arg(job.revision)
            .arg(job.state.as_str())
            .arg(doc)
            .arg(self.ttl_secs)
            .arg(job.id.to_string())
            .arg(if job.is_terminal() { "1" } else { "0" })
            .arg(output)
            .invoke_async(&mut conn)
            .await?;
        if swapped == 0 {
            debug!(job_id = %job.id, expected_revision, "CAS conflict");
        }
        Ok(swapped == 1)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn create(&self, job: &Job) -> Result<()> {
        let doc = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let created: i32 = self
            .create_script
            .key(self.keys.job(job.id))
            .key(self.keys.queue())
            .arg(job.revision)
            .arg(job.state.as_str())
            .arg(doc)
            .arg(self.ttl_secs)
            .arg(job.id.to_string())
            .invoke_async(&mut conn)
            .await?;
        if created == 0 {
            return Err(Error::Store(format!("job {} already exists", job.id)));
        }
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let doc: Option<String> = conn.hget(self.keys.job(job_id), "doc").await?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn get_output(&self, job_id: Uuid) -> Result<Option<JobOutput>> {
        let mut conn = self.conn.clone();
        let doc: Option<String> = conn.get(self.keys.output(job_id)).await?;
        match doc {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn compare_and_swap(&self, expected_revision: u64, job: &Job) -> Result<bool> {
        self.write(expected_revision, job, None).await
    }

    async fn complete(
        &self,
        expected_revision: u64,
        job: &Job,
        output: &JobOutput,
    ) -> Result<bool> {
        self.write(expected_revision, job, Some(output)).await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        loop {
            let head: Option<String> = conn.lindex(self.keys.queue(), 0).await?;
            let Some(raw) = head else {
                return Ok(None);
            };
            let Ok(job_id) = Uuid::parse_str(&raw) else {
                warn!(subsystem = "store", value = %raw, "Discarding malformed queue entry");
                let _: i64 = conn.lrem(self.keys.queue(), 1, &raw).await?;
                continue;
            };
            // The winning CAS dequeues the id. An error leaves it queued.
            if let Some(job) = self.claim(job_id, worker_id).await? {
                return Ok(Some(job));
            }
            // Expired, no longer pending, or taken by another claimer.
            let _: i64 = conn.lrem(self.keys.queue(), 1, &raw).await?;
        }
    }

    async fn list_active(&self) -> Result<Vec<Job>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.keys.active()).await?;
        let mut jobs = Vec::with_capacity(ids.len());
        for raw in ids {
            let job = match Uuid::parse_str(&raw) {
                Ok(job_id) => self.get(job_id).await?,
                Err(_) => None,
            };
            match job {
                Some(job) if job.state.is_active() => jobs.push(job),
                _ => {
                    // Record expired or already terminal.
                    let _: i64 = conn.srem(self.keys.active(), &raw).await?;
                }
            }
        }
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn pending_count(&self) -> Result<u64> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(self.keys.queue()).await?;
        Ok(len)
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(Error::Store(format!("unexpected PING reply: {}", pong)));
        }
        Ok(())
    }
}
