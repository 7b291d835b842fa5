use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{queue::JobQueue, workflow::WorkflowCoordinator};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<JobQueue>,
    pub coordinator: Arc<WorkflowCoordinator>,
}

impl AppState {
    pub fn new(db: PgPool, queue: Arc<JobQueue>, coordinator: WorkflowCoordinator) -> Self {
        Self {
            db,
            queue,
            coordinator: Arc::new(coordinator),
        }
    }
}
