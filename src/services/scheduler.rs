//! Bounded Task Scheduler.
//!
//! Runs one task per input key with at most `limit` tasks in flight. Keys are
//! started in submission order: a FIFO semaphore permit is acquired before each
//! spawn, so later keys wait for a free slot. A failing task never cancels its
//! siblings; every submitted task is drained before the outcome is returned.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::models::manifest::ImageResults;

pub const DEFAULT_CONCURRENCY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub key: String,
    pub reason: String,
}

/// Keyed results of one scheduler run.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub submitted: usize,
    pub results: ImageResults,
    pub failures: Vec<TaskFailure>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// All results when every task succeeded, else an aggregate error that
    /// still carries the completed subset.
    pub fn into_result(self) -> Result<ImageResults, SchedulerError> {
        if self.failures.is_empty() {
            Ok(self.results)
        } else {
            Err(SchedulerError::Incomplete {
                submitted: self.submitted,
                completed: self.results,
                failures: self.failures,
            })
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(
        "{} of {submitted} image tasks failed (first: {})",
        .failures.len(),
        first_failure(.failures)
    )]
    Incomplete {
        submitted: usize,
        completed: ImageResults,
        failures: Vec<TaskFailure>,
    },
}

fn first_failure(failures: &[TaskFailure]) -> String {
    failures
        .first()
        .map(|f| format!("{}: {}", f.key, f.reason))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct TaskScheduler {
    limit: usize,
    task_timeout: Duration,
}

impl TaskScheduler {
    pub fn new(limit: usize, task_timeout: Duration) -> Self {
        Self {
            limit: limit.max(1),
            task_timeout,
        }
    }

    /// Run `task` once per distinct key. Duplicate keys are skipped.
    pub async fn run<F, Fut, E>(&self, keys: Vec<String>, task: F) -> BatchOutcome
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<String, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut join_set = JoinSet::new();
        let mut seen = HashSet::new();
        let mut outstanding = HashSet::new();
        let mut outcome = BatchOutcome::default();

        for key in keys {
            if !seen.insert(key.clone()) {
                tracing::debug!(key = %key, "Skipping duplicate image task");
                continue;
            }
            outcome.submitted += 1;

            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                outcome.failures.push(TaskFailure {
                    key,
                    reason: "scheduler closed".to_string(),
                });
                continue;
            };

            outstanding.insert(key.clone());
            let fut = task(key.clone());
            let timeout = self.task_timeout;
            join_set.spawn(async move {
                let _permit = permit;
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(Ok(artifact)) => Ok(artifact),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
                };
                (key, result)
            });

            while let Some(joined) = join_set.try_join_next() {
                record(&mut outcome, &mut outstanding, joined);
            }
        }

        while let Some(joined) = join_set.join_next().await {
            record(&mut outcome, &mut outstanding, joined);
        }

        // Keys whose task panicked never reported back.
        for key in outstanding {
            metrics::counter!("dialcode_image_tasks_total", "outcome" => "failure").increment(1);
            outcome.failures.push(TaskFailure {
                key,
                reason: "task panicked".to_string(),
            });
        }

        metrics::histogram!("dialcode_image_batch_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            submitted = outcome.submitted,
            completed = outcome.results.len(),
            failed = outcome.failures.len(),
            limit = self.limit,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Image batch drained"
        );

        outcome
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, Duration::from_secs(30))
    }
}

fn record(
    outcome: &mut BatchOutcome,
    outstanding: &mut HashSet<String>,
    joined: Result<(String, Result<String, String>), JoinError>,
) {
    match joined {
        Ok((key, Ok(artifact))) => {
            metrics::counter!("dialcode_image_tasks_total", "outcome" => "success").increment(1);
            outstanding.remove(&key);
            outcome.results.insert(key, artifact);
        }
        Ok((key, Err(reason))) => {
            metrics::counter!("dialcode_image_tasks_total", "outcome" => "failure").increment(1);
            tracing::warn!(key = %key, reason = %reason, "Image task failed");
            outstanding.remove(&key);
            outcome.failures.push(TaskFailure { key, reason });
        }
        Err(e) => {
            tracing::error!(error = %e, "Image task aborted");
        }
    }
}
