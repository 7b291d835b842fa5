//! Image Task Unit: render one dial code and store the resulting image.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::models::manifest::storage_path;
use crate::models::render::RenderConfig;
use crate::services::storage::{ArtifactStore, StorageError};
use crate::services::upstream::UpstreamClient;

/// Renders and stores exactly one artifact per call, returning its key.
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(
        &self,
        dialcode: &str,
        config: &RenderConfig,
        channel: &str,
        publisher: Option<&str>,
    ) -> Result<String, RenderError>;
}

/// Renders through the QR rendering service, then uploads to object storage.
pub struct RemoteImageRenderer {
    upstream: UpstreamClient,
    storage: Arc<dyn ArtifactStore>,
    registry_url: String,
}

impl RemoteImageRenderer {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        storage: Arc<dyn ArtifactStore>,
        registry_url: &str,
    ) -> Result<Self, RenderError> {
        let upstream = UpstreamClient::new(base_url, timeout)
            .map_err(|e| RenderError::Service(e.to_string()))?;
        Ok(Self {
            upstream,
            storage,
            registry_url: registry_url.to_string(),
        })
    }
}

/// Storage key for a rendered dial code.
pub fn artifact_key(dialcode: &str, config: &RenderConfig, channel: &str, publisher: Option<&str>) -> String {
    format!(
        "{}{}.{}",
        storage_path(channel, publisher),
        dialcode,
        config.image_format.extension()
    )
}

#[async_trait]
impl ImageRenderer for RemoteImageRenderer {
    async fn render(
        &self,
        dialcode: &str,
        config: &RenderConfig,
        channel: &str,
        publisher: Option<&str>,
    ) -> Result<String, RenderError> {
        let body = json!({
            "data": format!("{}{}", self.registry_url, dialcode),
            "text": dialcode,
            "config": config,
        });

        let response = self
            .upstream
            .http()
            .post(self.upstream.url("v1/qrcode/render"))
            .json(&body)
            .send()
            .await
            .map_err(|e| RenderError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Rejected(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RenderError::Service(e.to_string()))?;

        let sniffed = image::guess_format(&bytes).map_err(|_| RenderError::NotAnImage)?;
        if !config.image_format.matches(sniffed) {
            return Err(RenderError::FormatMismatch {
                expected: config.image_format.to_string(),
                actual: format!("{sniffed:?}"),
            });
        }

        let key = artifact_key(dialcode, config, channel, publisher);
        self.storage
            .put(&key, &bytes, config.image_format.content_type())
            .await?;

        tracing::debug!(dialcode = %dialcode, key = %key, size = bytes.len(), "Dial code image stored");
        Ok(key)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Rendering service call failed: {0}")]
    Service(String),

    #[error("Rendering service rejected the request with status {0}")]
    Rejected(u16),

    #[error("Rendering service returned bytes that are not an image")]
    NotAnImage,

    #[error("Rendered image is {actual}, expected {expected}")]
    FormatMismatch { expected: String, actual: String },

    #[error("Failed to store rendered image: {0}")]
    Storage(#[from] StorageError),
}
