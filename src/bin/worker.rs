use dialcode_service::{
    config::AppConfig,
    db,
    services::{
        archive::{needs_requeue, Disposition, ManifestArchiver},
        queue::JobQueue,
        storage::R2Client,
        tracker::PgJobStore,
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_MS: u64 = 1000; // 1 second

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting dial code batch archive worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    let metrics_addr: SocketAddr = config
        .worker_metrics_addr
        .parse()
        .expect("WORKER_METRICS_ADDR must be a socket address");
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .expect("Failed to install Prometheus exporter");
    tracing::info!(addr = %metrics_addr, "Worker metrics listener started");

    metrics::describe_counter!(
        "dialcode_batch_jobs_completed",
        "Total image batch jobs archived"
    );
    metrics::describe_counter!(
        "dialcode_batch_jobs_failed",
        "Total image batch jobs that failed"
    );
    metrics::describe_gauge!(
        "dialcode_batch_queue_depth",
        "Current number of batch jobs waiting to be archived"
    );

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Initializing services");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    let archiver = ManifestArchiver::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(r2_client),
    );

    tracing::info!("Worker ready, starting batch archive loop");

    loop {
        match process_next_job(&queue, &archiver).await {
            Ok(true) => {
                tracing::debug!("Batch job processed, checking for next job");
            }
            Ok(false) => {
                tracing::trace!("No batch jobs available, sleeping");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Error processing batch job, will retry");
                sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
            }
        }
    }
}

/// Archive the next queued batch.
/// Returns Ok(true) if a job was taken, Ok(false) if the queue was empty.
async fn process_next_job(
    queue: &JobQueue,
    archiver: &ManifestArchiver,
) -> Result<bool, Box<dyn std::error::Error>> {
    if let Ok(depth) = queue.queue_depth().await {
        metrics::gauge!("dialcode_batch_queue_depth").set(depth as f64);
    }

    let job = match queue.dequeue().await? {
        Some(j) => j,
        None => return Ok(false),
    };

    tracing::info!(
        process_id = %job.process_id,
        channel = %job.channel,
        "Archiving batch job"
    );

    let result = archiver.process(&job).await;
    if needs_requeue(&result) {
        queue.requeue(&job).await?;
    } else {
        queue.complete(&job).await?;
    }

    match result? {
        Disposition::Retry(retry_count) => {
            tracing::info!(
                process_id = %job.process_id,
                retry_count = retry_count,
                "Batch job re-queued for retry"
            );
        }
        disposition => {
            tracing::debug!(
                process_id = %job.process_id,
                state = ?disposition.job_status(),
                "Queue entry settled"
            );
        }
    }
    Ok(true)
}
