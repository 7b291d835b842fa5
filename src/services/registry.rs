use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::UpstreamError;
use crate::models::context::RequestContext;
use crate::services::upstream::{UpstreamClient, UpstreamReply};

/// External dial code registry. Every method takes the `request` object of
/// the caller's body and returns the raw upstream reply.
#[async_trait]
pub trait DialcodeRegistry: Send + Sync {
    async fn generate(&self, request: &Value, ctx: &RequestContext)
        -> Result<UpstreamReply, UpstreamError>;

    async fn list(&self, request: &Value, ctx: &RequestContext)
        -> Result<UpstreamReply, UpstreamError>;

    async fn search(&self, request: &Value, ctx: &RequestContext)
        -> Result<UpstreamReply, UpstreamError>;

    async fn read(&self, dialcode_id: &str, ctx: &RequestContext)
        -> Result<UpstreamReply, UpstreamError>;

    async fn update(
        &self,
        dialcode_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn publish(
        &self,
        dialcode_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn link(&self, request: &Value, ctx: &RequestContext)
        -> Result<UpstreamReply, UpstreamError>;

    /// `body` is the caller's full body, forwarded unchanged.
    async fn reserve(
        &self,
        content_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn release(
        &self,
        content_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn create_publisher(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn read_publisher(
        &self,
        publisher_id: &str,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;

    async fn update_publisher(
        &self,
        publisher_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError>;
}

/// HTTP client for the registry's v3 API.
pub struct RegistryClient {
    upstream: UpstreamClient,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            upstream: UpstreamClient::new(base_url, timeout)?,
        })
    }

    async fn post(
        &self,
        path: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        let body = json!({ "request": request });
        self.upstream
            .send(Method::POST, path, ctx, &[], Some(&body))
            .await
    }

    async fn patch(
        &self,
        path: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        let body = json!({ "request": request });
        self.upstream
            .send(Method::PATCH, path, ctx, &[], Some(&body))
            .await
    }

    async fn get(&self, path: &str, ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        self.upstream.send(Method::GET, path, ctx, &[], None).await
    }
}

#[async_trait]
impl DialcodeRegistry for RegistryClient {
    async fn generate(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post("dialcode/v3/generate", request, ctx).await
    }

    async fn list(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post("dialcode/v3/list", request, ctx).await
    }

    async fn search(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post("dialcode/v3/search", request, ctx).await
    }

    async fn read(
        &self,
        dialcode_id: &str,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.get(&format!("dialcode/v3/read/{dialcode_id}"), ctx).await
    }

    async fn update(
        &self,
        dialcode_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.patch(&format!("dialcode/v3/update/{dialcode_id}"), request, ctx)
            .await
    }

    async fn publish(
        &self,
        dialcode_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post(&format!("dialcode/v3/publish/{dialcode_id}"), request, ctx)
            .await
    }

    async fn link(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post("content/v3/dialcode/link", request, ctx).await
    }

    async fn reserve(
        &self,
        content_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.upstream
            .send(
                Method::POST,
                &format!("content/v3/dialcode/reserve/{content_id}"),
                ctx,
                &[],
                Some(body),
            )
            .await
    }

    async fn release(
        &self,
        content_id: &str,
        body: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.upstream
            .send(
                Method::PATCH,
                &format!("content/v3/dialcode/release/{content_id}"),
                ctx,
                &[],
                Some(body),
            )
            .await
    }

    async fn create_publisher(
        &self,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.post("dialcode/v3/publisher/create", request, ctx).await
    }

    async fn read_publisher(
        &self,
        publisher_id: &str,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.get(&format!("dialcode/v3/publisher/read/{publisher_id}"), ctx)
            .await
    }

    async fn update_publisher(
        &self,
        publisher_id: &str,
        request: &Value,
        ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.patch(
            &format!("dialcode/v3/publisher/update/{publisher_id}"),
            request,
            ctx,
        )
        .await
    }
}
