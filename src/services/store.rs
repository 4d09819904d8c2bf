//! Redis-backed job store.
//!
//! Layout: `job:{id}:metadata` holds the serialized JobRecord and
//! `job:{id}:result` the location of the persisted hOCR file; both keys get
//! the same TTL the moment a terminal state is reached, so storage age-out
//! and the record's own expiry stay consistent. A pending list feeds the
//! worker. An expired or evicted key reads back as `None`, which callers
//! treat the same as a job that never existed.

use chrono::Utc;
use redis::AsyncCommands;

use crate::models::job::JobRecord;

const PENDING_KEY: &str = "ocr:jobs";

fn metadata_key(job_id: &str) -> String {
    format!("job:{job_id}:metadata")
}

fn result_key(job_id: &str) -> String {
    format!("job:{job_id}:result")
}

pub struct JobStore {
    client: redis::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl JobStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(StoreError::Redis)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Upsert the full record. Once the record carries an expiration time,
    /// both of its keys get a TTL of `expiration - now`.
    pub async fn put_record(&self, record: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;
        conn.set::<_, _, ()>(metadata_key(&record.job_id), &payload)
            .await?;

        if let Some(expiration) = record.expiration_time {
            let ttl = (expiration - Utc::now()).num_seconds().max(1);
            conn.expire::<_, ()>(metadata_key(&record.job_id), ttl).await?;
            conn.expire::<_, ()>(result_key(&record.job_id), ttl).await?;
        }
        Ok(())
    }

    pub async fn get_record(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.get(metadata_key(job_id)).await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Store where the hOCR result for a completed job was persisted.
    pub async fn put_result_location(&self, job_id: &str, path: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(result_key(job_id), path).await?;
        Ok(())
    }

    pub async fn get_result_location(&self, job_id: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(result_key(job_id)).await?)
    }

    /// Push a job id onto the pending list for the worker.
    pub async fn enqueue(&self, job_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(PENDING_KEY, job_id).await?;
        Ok(())
    }

    /// Pop the next pending job id, if any.
    pub async fn dequeue(&self) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.rpop(PENDING_KEY, None).await?)
    }

    /// Current number of pending jobs (for the queue-depth gauge).
    pub async fn queue_depth(&self) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(PENDING_KEY).await?)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
