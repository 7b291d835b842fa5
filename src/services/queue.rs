use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::tracker::{JobDispatcher, TrackerError};

const QUEUE_KEY: &str = "dialcode:batch_jobs";
const PROCESSING_KEY: &str = "dialcode:batch_processing";

/// Batch job payload serialized into Redis.
///
/// Carries only the process id and channel; the manifest lives in the job store.
/// The JSON form is deterministic, so the payload pushed by `enqueue` is the exact
/// string `complete` and `requeue` remove from the processing list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedBatch {
    pub process_id: Uuid,
    pub channel: String,
}

/// Redis list queue between batch submission and the archive worker.
///
/// `dequeue` moves an entry from `dialcode:batch_jobs` to `dialcode:batch_processing`
/// with `RPOPLPUSH`, so a batch is never lost between pop and archive. Each process id
/// is submitted once, so removing a single matching entry (`LREM` count 1) settles
/// exactly the batch the worker just handled.
pub struct JobQueue {
    client: redis::Client,
}

impl JobQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Push a submitted batch onto the head of the wait list.
    pub async fn enqueue(&self, job: &QueuedBatch) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Take the oldest waiting batch, parking it on the processing list.
    pub async fn dequeue(&self) -> Result<Option<QueuedBatch>, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let job: QueuedBatch = serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Number of batches waiting to be archived. Parked entries are not counted.
    pub async fn queue_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    /// Drop a settled batch from the processing list.
    pub async fn complete(&self, job: &QueuedBatch) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Move a parked batch back onto the wait list in one transaction.
    pub async fn requeue(&self, job: &QueuedBatch) -> Result<(), QueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(QueueError::Redis)?;
        let payload = serde_json::to_string(job).map_err(QueueError::Serialize)?;
        redis::pipe()
            .atomic()
            .lrem(PROCESSING_KEY, 1, &payload)
            .ignore()
            .lpush(QUEUE_KEY, &payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl JobDispatcher for JobQueue {
    async fn dispatch(&self, job: &QueuedBatch) -> Result<(), TrackerError> {
        self.enqueue(job).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_stable_for_lrem() {
        let job = QueuedBatch {
            process_id: Uuid::nil(),
            channel: "ch1".to_string(),
        };
        let first = serde_json::to_string(&job).unwrap();
        let second = serde_json::to_string(&job.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            r#"{"process_id":"00000000-0000-0000-0000-000000000000","channel":"ch1"}"#
        );
    }
}
