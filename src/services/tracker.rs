//! Batch Job Tracker.
//!
//! `submit` registers a manifest as a pending job and hands its process id to the
//! worker queue; `status` is a pure read of the job's lifecycle state. A job is
//! written once at submission and afterwards only by the worker that archives it.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::queries;
use crate::models::context::RequestContext;
use crate::models::envelope::{ApiEnvelope, ResponseCode};
use crate::models::job::{BatchJob, JobStatus};
use crate::models::manifest::Manifest;
use crate::models::outcome::Operation;
use crate::services::queue::{QueueError, QueuedBatch};

/// Persistence for batch jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job; fails if the process id already exists.
    async fn insert(&self, job: &BatchJob) -> Result<(), TrackerError>;

    async fn fetch(&self, process_id: Uuid) -> Result<Option<BatchJob>, TrackerError>;

    async fn mark_completed(&self, process_id: Uuid, result: Value) -> Result<(), TrackerError>;

    async fn mark_failed(&self, process_id: Uuid, failure: &FailureRecord) -> Result<(), TrackerError>;

    /// Bump the retry counter, returning the new value.
    async fn increment_retry(&self, process_id: Uuid) -> Result<i32, TrackerError>;
}

/// Hands a submitted job to whatever archives it.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &QueuedBatch) -> Result<(), TrackerError>;
}

/// Error payload stored on a failed job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub code: u16,
    pub err: String,
    pub errmsg: String,
}

impl FailureRecord {
    pub fn server_error(errmsg: impl Into<String>) -> Self {
        Self {
            code: 500,
            err: Operation::ProcessStatus.failed_code(),
            errmsg: errmsg.into(),
        }
    }
}

/// Successful status read: an HTTP-style code plus the body to return.
#[derive(Debug, Clone)]
pub struct JobStatusView {
    pub state: JobStatus,
    pub code: u16,
    pub data: ApiEnvelope,
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("Batch job {0} not found")]
    NotFound(String),

    /// The job itself failed; `data` is the error body to relay.
    #[error("Batch job failed with status {code}")]
    Failed { code: u16, data: ApiEnvelope },

    #[error(transparent)]
    Store(#[from] TrackerError),
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Batch job {0} already exists")]
    Duplicate(Uuid),

    #[error("Batch job {0} does not exist")]
    Missing(Uuid),
}

pub struct BatchJobTracker {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl BatchJobTracker {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Register the manifest as a pending job and queue it for archiving.
    pub async fn submit(
        &self,
        manifest: Manifest,
        channel: &str,
        publisher: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Uuid, TrackerError> {
        let job = BatchJob::new(manifest, channel, publisher);
        let process_id = job.process_id;
        self.store.insert(&job).await?;

        let queued = QueuedBatch {
            process_id,
            channel: channel.to_string(),
        };
        if let Err(e) = self.dispatcher.dispatch(&queued).await {
            tracing::error!(process_id = %process_id, error = %e, "Batch job dispatch failed");
            let failure = FailureRecord::server_error(format!("dispatch failed: {e}"));
            if let Err(mark) = self.store.mark_failed(process_id, &failure).await {
                tracing::error!(process_id = %process_id, error = %mark, "Could not mark undispatched job failed");
            }
            return Err(e);
        }

        metrics::counter!("dialcode_batch_jobs_submitted").increment(1);
        tracing::info!(
            process_id = %process_id,
            channel = %channel,
            publisher = publisher.unwrap_or(""),
            images = job.manifest.image_count(),
            msgid = ctx.request_id.as_deref().unwrap_or(""),
            "Batch job submitted"
        );
        Ok(process_id)
    }

    /// Read the job's state. Unknown ids, including ids that are not UUIDs, are
    /// reported as not found.
    pub async fn status(
        &self,
        ctx: &RequestContext,
        process_id: &str,
    ) -> Result<JobStatusView, StatusError> {
        let Ok(id) = Uuid::parse_str(process_id) else {
            return Err(StatusError::NotFound(process_id.to_string()));
        };
        let job = self
            .store
            .fetch(id)
            .await?
            .ok_or_else(|| StatusError::NotFound(process_id.to_string()))?;

        let api_id = Operation::ProcessStatus.api_id();
        let mut result = Map::new();
        result.insert("processId".to_string(), json!(id));

        match job.status {
            JobStatus::Pending => {
                result.insert("status".to_string(), json!("in-process"));
                Ok(JobStatusView {
                    state: JobStatus::Pending,
                    code: 200,
                    data: ApiEnvelope::success(&api_id, ctx, result),
                })
            }
            JobStatus::Completed => {
                result.insert("status".to_string(), json!("completed"));
                if let Some(Value::Object(payload)) = job.result {
                    result.extend(payload);
                }
                Ok(JobStatusView {
                    state: JobStatus::Completed,
                    code: 200,
                    data: ApiEnvelope::success(&api_id, ctx, result),
                })
            }
            JobStatus::Failed => {
                result.insert("status".to_string(), json!("failed"));
                let failure = job
                    .error
                    .and_then(|e| serde_json::from_value::<FailureRecord>(e).ok())
                    .unwrap_or_else(|| FailureRecord::server_error("batch job failed"));
                let response_code = if failure.code < 500 {
                    ResponseCode::ClientError
                } else {
                    ResponseCode::ServerError
                };
                Err(StatusError::Failed {
                    code: failure.code,
                    data: ApiEnvelope::error(
                        &api_id,
                        ctx,
                        response_code,
                        failure.err,
                        failure.errmsg,
                        result,
                    ),
                })
            }
        }
    }
}

/// Postgres-backed job store.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &BatchJob) -> Result<(), TrackerError> {
        let inserted = queries::create_batch_job(&self.pool, job).await?;
        if inserted {
            Ok(())
        } else {
            Err(TrackerError::Duplicate(job.process_id))
        }
    }

    async fn fetch(&self, process_id: Uuid) -> Result<Option<BatchJob>, TrackerError> {
        queries::get_batch_job(&self.pool, process_id).await
    }

    async fn mark_completed(&self, process_id: Uuid, result: Value) -> Result<(), TrackerError> {
        queries::finish_batch_job(&self.pool, process_id, JobStatus::Completed, Some(result), None)
            .await?;
        Ok(())
    }

    async fn mark_failed(&self, process_id: Uuid, failure: &FailureRecord) -> Result<(), TrackerError> {
        let error = serde_json::to_value(failure)?;
        queries::finish_batch_job(&self.pool, process_id, JobStatus::Failed, None, Some(error))
            .await?;
        Ok(())
    }

    async fn increment_retry(&self, process_id: Uuid) -> Result<i32, TrackerError> {
        Ok(queries::increment_retry_count(&self.pool, process_id).await?)
    }
}

/// In-process job store, for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, BatchJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    async fn update<F>(&self, process_id: Uuid, apply: F) -> Result<(), TrackerError>
    where
        F: FnOnce(&mut BatchJob) + Send,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&process_id)
            .ok_or(TrackerError::Missing(process_id))?;
        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }

    /// Terminal jobs are left untouched, matching the guarded SQL update.
    async fn finish<F>(&self, process_id: Uuid, apply: F) -> Result<(), TrackerError>
    where
        F: FnOnce(&mut BatchJob) + Send,
    {
        self.update(process_id, |job| {
            if !job.status.is_terminal() {
                apply(job);
            }
        })
        .await
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &BatchJob) -> Result<(), TrackerError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.process_id) {
            return Err(TrackerError::Duplicate(job.process_id));
        }
        jobs.insert(job.process_id, job.clone());
        Ok(())
    }

    async fn fetch(&self, process_id: Uuid) -> Result<Option<BatchJob>, TrackerError> {
        Ok(self.jobs.read().await.get(&process_id).cloned())
    }

    async fn mark_completed(&self, process_id: Uuid, result: Value) -> Result<(), TrackerError> {
        self.finish(process_id, |job| {
            job.status = JobStatus::Completed;
            job.result = Some(result);
        })
        .await
    }

    async fn mark_failed(&self, process_id: Uuid, failure: &FailureRecord) -> Result<(), TrackerError> {
        let error = serde_json::to_value(failure)?;
        self.finish(process_id, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        })
        .await
    }

    async fn increment_retry(&self, process_id: Uuid) -> Result<i32, TrackerError> {
        let mut count = 0;
        self.update(process_id, |job| {
            job.retry_count += 1;
            count = job.retry_count;
        })
        .await?;
        Ok(count)
    }
}
