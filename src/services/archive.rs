//! Manifest archiving: the worker half of a batch job.

use serde_json::json;
use std::sync::Arc;

use crate::models::job::JobStatus;
use crate::models::manifest::Manifest;
use crate::services::queue::QueuedBatch;
use crate::services::storage::{ArtifactStore, StorageError};
use crate::services::tracker::{FailureRecord, JobStore, TrackerError};

pub const MAX_RETRIES: i32 = 3;

/// What the worker should do with the queue entry after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Completed,
    /// Archiving failed but may be retried.
    Retry(i32),
    Failed,
    /// Job unknown or already terminal; drop the entry.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Manifest serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct ManifestArchiver {
    store: Arc<dyn JobStore>,
    storage: Arc<dyn ArtifactStore>,
}

impl ManifestArchiver {
    pub fn new(store: Arc<dyn JobStore>, storage: Arc<dyn ArtifactStore>) -> Self {
        Self { store, storage }
    }

    /// Write the job's manifest to storage and record the terminal state.
    /// Errors are only returned when the job store itself is unreachable.
    pub async fn process(&self, queued: &QueuedBatch) -> Result<Disposition, TrackerError> {
        let Some(job) = self.store.fetch(queued.process_id).await? else {
            tracing::warn!(process_id = %queued.process_id, "Queued batch job has no record");
            return Ok(Disposition::Skipped);
        };
        if job.status.is_terminal() {
            return Ok(Disposition::Skipped);
        }

        let key = job.manifest.archive_key(&job.process_id.to_string());
        match self.write_manifest(&key, &job.manifest).await {
            Ok(()) => {
                let mut result = json!({
                    "manifestKey": key,
                    "container": job.manifest.storage.container,
                    "dialcodeCount": job.manifest.image_count(),
                });
                if let Some(file_name) = &job.manifest.storage.file_name {
                    result["fileName"] = json!(file_name);
                }
                self.store.mark_completed(job.process_id, result).await?;

                metrics::counter!("dialcode_batch_jobs_completed").increment(1);
                tracing::info!(
                    process_id = %job.process_id,
                    manifest_key = %key,
                    dialcodes = job.manifest.image_count(),
                    "Batch job archived"
                );
                Ok(Disposition::Completed)
            }
            Err(e) => {
                tracing::error!(process_id = %job.process_id, error = %e, "Manifest archive failed");
                let retry_count = self.store.increment_retry(job.process_id).await?;

                if retry_count >= MAX_RETRIES {
                    let failure = FailureRecord::server_error(format!(
                        "Archiving failed after {MAX_RETRIES} retries: {e}"
                    ));
                    self.store.mark_failed(job.process_id, &failure).await?;
                    metrics::counter!("dialcode_batch_jobs_failed").increment(1);
                    tracing::warn!(
                        process_id = %job.process_id,
                        retry_count = retry_count,
                        "Batch job failed after max retries"
                    );
                    Ok(Disposition::Failed)
                } else {
                    Ok(Disposition::Retry(retry_count))
                }
            }
        }
    }

    async fn write_manifest(&self, key: &str, manifest: &Manifest) -> Result<(), ArchiveError> {
        let body = serde_json::to_vec(manifest)?;
        self.storage.put(key, &body, "application/json").await?;
        Ok(())
    }
}

/// Whether the queue entry goes back on the wait list. A store error leaves the
/// job pending, so its entry is handed back instead of staying parked.
pub fn needs_requeue(result: &Result<Disposition, TrackerError>) -> bool {
    matches!(result, Ok(Disposition::Retry(_)) | Err(_))
}

impl Disposition {
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            Disposition::Completed => Some(JobStatus::Completed),
            Disposition::Failed => Some(JobStatus::Failed),
            Disposition::Retry(_) | Disposition::Skipped => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::BatchJob;
    use crate::models::manifest::{Manifest, ManifestEntry, StorageDescriptor};
    use crate::models::render::RenderConfig;
    use crate::services::tracker::MemoryJobStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct UnreachableStore;

    #[async_trait]
    impl JobStore for UnreachableStore {
        async fn insert(&self, _job: &BatchJob) -> Result<(), TrackerError> {
            Err(TrackerError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn fetch(&self, _process_id: Uuid) -> Result<Option<BatchJob>, TrackerError> {
            Err(TrackerError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn mark_completed(&self, _process_id: Uuid, _result: Value) -> Result<(), TrackerError> {
            Err(TrackerError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn mark_failed(
            &self,
            _process_id: Uuid,
            _failure: &FailureRecord,
        ) -> Result<(), TrackerError> {
            Err(TrackerError::Database(sqlx::Error::PoolTimedOut))
        }

        async fn increment_retry(&self, _process_id: Uuid) -> Result<i32, TrackerError> {
            Err(TrackerError::Database(sqlx::Error::PoolTimedOut))
        }
    }

    #[derive(Default)]
    struct FlakyStorage {
        fail: bool,
        written: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl ArtifactStore for FlakyStorage {
        async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Config("bucket unavailable".to_string()));
            }
            self.written.lock().unwrap().push((key.to_string(), data.to_vec()));
            Ok(())
        }
    }

    fn job(file_name: Option<&str>) -> BatchJob {
        let manifest = Manifest {
            dialcodes: vec![ManifestEntry {
                data: "https://dial.example/dial/A1B2C3".to_string(),
                text: "A1B2C3".to_string(),
                id: "ch1/A1B2C3.png".to_string(),
            }],
            object_id: "do_1".to_string(),
            config: RenderConfig::default(),
            storage: StorageDescriptor {
                container: "dial".to_string(),
                path: "ch1/".to_string(),
                file_name: file_name.map(str::to_string),
            },
        };
        BatchJob::new(manifest, "ch1", None)
    }

    async fn seeded(job: &BatchJob) -> Arc<MemoryJobStore> {
        let store = Arc::new(MemoryJobStore::new());
        store.insert(job).await.unwrap();
        store
    }

    fn queued(job: &BatchJob) -> QueuedBatch {
        QueuedBatch {
            process_id: job.process_id,
            channel: job.channel.clone(),
        }
    }

    #[tokio::test]
    async fn test_archive_completes_job() {
        let job = job(Some("do_1_English_42"));
        let store = seeded(&job).await;
        let storage = Arc::new(FlakyStorage::default());
        let archiver = ManifestArchiver::new(store.clone(), storage.clone());

        let disposition = archiver.process(&queued(&job)).await.unwrap();
        assert_eq!(disposition, Disposition::Completed);

        let written = storage.written.lock().unwrap();
        assert_eq!(written[0].0, "ch1/do_1_English_42.json");
        let manifest: Manifest = serde_json::from_slice(&written[0].1).unwrap();
        assert_eq!(manifest.image_count(), 1);

        let stored = store.fetch(job.process_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        let result = stored.result.unwrap();
        assert_eq!(result["manifestKey"], "ch1/do_1_English_42.json");
        assert_eq!(result["dialcodeCount"], 1);
        assert_eq!(result["fileName"], "do_1_English_42");
    }

    #[tokio::test]
    async fn test_archive_key_falls_back_to_process_id() {
        let job = job(None);
        let store = seeded(&job).await;
        let storage = Arc::new(FlakyStorage::default());
        let archiver = ManifestArchiver::new(store, storage.clone());

        archiver.process(&queued(&job)).await.unwrap();
        assert_eq!(
            storage.written.lock().unwrap()[0].0,
            format!("ch1/{}.json", job.process_id)
        );
    }

    #[tokio::test]
    async fn test_retries_then_fails() {
        let job = job(None);
        let store = seeded(&job).await;
        let storage = Arc::new(FlakyStorage {
            fail: true,
            ..Default::default()
        });
        let archiver = ManifestArchiver::new(store.clone(), storage);

        assert_eq!(archiver.process(&queued(&job)).await.unwrap(), Disposition::Retry(1));
        assert_eq!(archiver.process(&queued(&job)).await.unwrap(), Disposition::Retry(2));
        assert_eq!(archiver.process(&queued(&job)).await.unwrap(), Disposition::Failed);

        let stored = store.fetch(job.process_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error.unwrap()["code"], 500);

        // Terminal jobs are not reprocessed.
        assert_eq!(archiver.process(&queued(&job)).await.unwrap(), Disposition::Skipped);
    }

    #[tokio::test]
    async fn test_unknown_job_skipped() {
        let store = Arc::new(MemoryJobStore::new());
        let archiver = ManifestArchiver::new(store, Arc::new(FlakyStorage::default()));
        let orphan = QueuedBatch {
            process_id: uuid::Uuid::new_v4(),
            channel: "ch1".to_string(),
        };
        assert_eq!(archiver.process(&orphan).await.unwrap(), Disposition::Skipped);
        assert_eq!(Disposition::Skipped.job_status(), None);
        assert_eq!(Disposition::Completed.job_status(), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn test_store_outage_hands_entry_back() {
        let job = job(None);
        let archiver = ManifestArchiver::new(
            Arc::new(UnreachableStore),
            Arc::new(FlakyStorage::default()),
        );

        let result = archiver.process(&queued(&job)).await;
        assert!(matches!(result, Err(TrackerError::Database(_))));
        assert!(needs_requeue(&result));
    }

    #[test]
    fn test_needs_requeue_by_disposition() {
        assert!(needs_requeue(&Ok(Disposition::Retry(1))));
        assert!(!needs_requeue(&Ok(Disposition::Completed)));
        assert!(!needs_requeue(&Ok(Disposition::Failed)));
        assert!(!needs_requeue(&Ok(Disposition::Skipped)));
    }
}
