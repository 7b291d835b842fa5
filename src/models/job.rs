use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::models::manifest::Manifest;

/// Lifecycle state of a batch image job. `Pending` moves to exactly one of the
/// terminal states.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// A submitted image batch, tracked by its process identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub process_id: Uuid,
    pub status: JobStatus,
    pub channel: String,
    pub publisher: Option<String>,
    pub manifest: Manifest,
    pub result: Option<Value>,
    pub error: Option<Value>,
    pub retry_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(manifest: Manifest, channel: &str, publisher: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            process_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            channel: channel.to_string(),
            publisher: publisher.map(str::to_string),
            manifest,
            result: None,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!("completed".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("processing".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }
}
