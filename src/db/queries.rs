use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::job::{BatchJob, JobStatus};
use crate::services::tracker::TrackerError;

/// Insert a new batch job. Returns false if the process id already exists.
pub async fn create_batch_job(pool: &PgPool, job: &BatchJob) -> Result<bool, TrackerError> {
    let manifest = serde_json::to_value(&job.manifest)?;

    let result = sqlx::query(
        r#"
        INSERT INTO dialcode_batch_jobs
            (process_id, status, channel, publisher, manifest, retry_count, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (process_id) DO NOTHING
        "#,
    )
    .bind(job.process_id)
    .bind(job.status.to_string())
    .bind(&job.channel)
    .bind(job.publisher.as_deref())
    .bind(manifest)
    .bind(job.retry_count)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Get a batch job by process id
pub async fn get_batch_job(pool: &PgPool, process_id: Uuid) -> Result<Option<BatchJob>, TrackerError> {
    let row = sqlx::query(
        r#"
        SELECT process_id, status, channel, publisher, manifest, result, error,
               retry_count, created_at, updated_at
        FROM dialcode_batch_jobs
        WHERE process_id = $1
        "#,
    )
    .bind(process_id)
    .fetch_optional(pool)
    .await?;

    row.map(batch_job_from_row).transpose()
}

fn batch_job_from_row(r: PgRow) -> Result<BatchJob, TrackerError> {
    let status: String = r.try_get("status")?;
    let status = status.parse::<JobStatus>().unwrap_or_else(|_| {
        tracing::warn!(status = %status, "Unknown batch job status, treating as pending");
        JobStatus::Pending
    });
    let manifest: serde_json::Value = r.try_get("manifest")?;

    Ok(BatchJob {
        process_id: r.try_get("process_id")?,
        status,
        channel: r.try_get("channel")?,
        publisher: r.try_get("publisher")?,
        manifest: serde_json::from_value(manifest)?,
        result: r.try_get("result")?,
        error: r.try_get("error")?,
        retry_count: r.try_get("retry_count")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

/// Move a pending job to a terminal state. Terminal jobs are left untouched.
pub async fn finish_batch_job(
    pool: &PgPool,
    process_id: Uuid,
    status: JobStatus,
    result: Option<serde_json::Value>,
    error: Option<serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE dialcode_batch_jobs
        SET status = $1,
            result = $2,
            error = $3,
            updated_at = NOW()
        WHERE process_id = $4 AND status = 'pending'
        "#,
    )
    .bind(status.to_string())
    .bind(result)
    .bind(error)
    .bind(process_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Increment retry count
pub async fn increment_retry_count(pool: &PgPool, process_id: Uuid) -> Result<i32, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE dialcode_batch_jobs
        SET retry_count = retry_count + 1,
            updated_at = NOW()
        WHERE process_id = $1
        RETURNING retry_count
        "#,
    )
    .bind(process_id)
    .fetch_one(pool)
    .await?;

    row.try_get("retry_count")
}
