use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string (batch job registry)
    pub database_url: String,

    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    /// Redis connection string for the batch job queue
    pub redis_url: String,

    /// Base URL of the dial code registry
    pub registry_base_url: String,

    /// Base URL of the content metadata service
    pub content_base_url: String,

    /// Base URL of the QR image rendering service
    pub renderer_base_url: String,

    /// Prefix a dial code is appended to when forming its resolution URL
    pub dial_registry_url: String,

    /// R2 bucket name
    pub r2_bucket: String,

    /// R2 access key ID (S3-compatible)
    pub r2_access_key: String,

    /// R2 secret access key (S3-compatible)
    pub r2_secret_key: String,

    /// R2 endpoint URL
    pub r2_endpoint: String,

    /// Logical container recorded in batch manifests
    #[serde(default = "default_storage_container")]
    pub storage_container: String,

    /// Requests above this count still succeed but are reported as partial success
    #[serde(default = "default_max_generate_count")]
    pub dialcode_generate_max_count: u64,

    /// Maximum number of image renders in flight for one batch
    #[serde(default = "default_image_concurrency")]
    pub image_concurrency: usize,

    #[serde(default = "default_image_task_timeout_secs")]
    pub image_task_timeout_secs: u64,

    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Wall-clock budget for the whole image pipeline of one request
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,

    /// Floor for the HTTP request timeout; raised when the workflow chain needs longer
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Prometheus listener for the worker process
    #[serde(default = "default_worker_metrics_addr")]
    pub worker_metrics_addr: String,
}

/// Headroom between the slowest workflow chain and the HTTP request timeout.
const REQUEST_TIMEOUT_MARGIN_SECS: u64 = 30;

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_max_connections() -> u32 {
    20
}

fn default_storage_container() -> String {
    "dial".to_string()
}

fn default_max_generate_count() -> u64 {
    1000
}

fn default_image_concurrency() -> usize {
    100
}

fn default_image_task_timeout_secs() -> u64 {
    30
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_pipeline_timeout_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    390
}

fn default_worker_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn image_task_timeout(&self) -> Duration {
        Duration::from_secs(self.image_task_timeout_secs)
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }

    /// Worst case for one request: registry call, image pipeline, content update.
    pub fn workflow_budget(&self) -> Duration {
        Duration::from_secs(
            self.upstream_timeout_secs
                .saturating_mul(2)
                .saturating_add(self.pipeline_timeout_secs),
        )
    }

    /// Configured timeout, raised to the workflow budget plus a margin.
    pub fn request_timeout(&self) -> Duration {
        let floor = self.workflow_budget() + Duration::from_secs(REQUEST_TIMEOUT_MARGIN_SECS);
        Duration::from_secs(self.request_timeout_secs).max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn required_vars() -> Vec<(String, String)> {
        vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/dial".to_string()),
            ("REDIS_URL".to_string(), "redis://localhost".to_string()),
            ("REGISTRY_BASE_URL".to_string(), "http://registry".to_string()),
            ("CONTENT_BASE_URL".to_string(), "http://content".to_string()),
            ("RENDERER_BASE_URL".to_string(), "http://renderer".to_string()),
            ("DIAL_REGISTRY_URL".to_string(), "https://dial.example/dial/".to_string()),
            ("R2_BUCKET".to_string(), "dial".to_string()),
            ("R2_ACCESS_KEY".to_string(), "ak".to_string()),
            ("R2_SECRET_KEY".to_string(), "sk".to_string()),
            ("R2_ENDPOINT".to_string(), "http://r2".to_string()),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config: AppConfig = envy::from_iter(required_vars()).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.database_max_connections, 20);
        assert_eq!(config.storage_container, "dial");
        assert_eq!(config.dialcode_generate_max_count, 1000);
        assert_eq!(config.image_concurrency, 100);
        assert_eq!(config.pipeline_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_request_timeout_covers_reserve_chain() {
        let config: AppConfig = envy::from_iter(required_vars()).unwrap();
        let reserve_chain = config.upstream_timeout() * 2 + config.pipeline_timeout();
        assert!(config.request_timeout() > reserve_chain);
        assert_eq!(config.worker_metrics_addr, "0.0.0.0:9091");
    }

    #[test]
    fn test_short_request_timeout_is_raised() {
        let mut vars = required_vars();
        vars.push(("REQUEST_TIMEOUT_SECS".to_string(), "60".to_string()));
        vars.push(("UPSTREAM_TIMEOUT_SECS".to_string(), "10".to_string()));
        vars.push(("PIPELINE_TIMEOUT_SECS".to_string(), "100".to_string()));
        let config: AppConfig = envy::from_iter(vars).unwrap();

        assert_eq!(config.workflow_budget(), Duration::from_secs(120));
        assert_eq!(config.request_timeout(), Duration::from_secs(150));
    }

    #[test]
    fn test_longer_request_timeout_is_kept() {
        let mut vars = required_vars();
        vars.push(("REQUEST_TIMEOUT_SECS".to_string(), "900".to_string()));
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(900));
    }
}
