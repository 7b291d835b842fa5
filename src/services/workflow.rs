//! Workflow Coordinator.
//!
//! Every workflow runs its stages strictly in sequence: validation, the primary
//! registry call, the optional image pipeline, then the optional content update.
//! Each stage yields a [`WorkflowOutcome`]; a failure after the primary call has
//! succeeded never discards the primary result.

use garde::Validate;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ClientError, UpstreamError};
use crate::models::context::RequestContext;
use crate::models::dialcode::{
    lookup, GenerateBody, LinkBody, ListBody, PublisherBody, ReserveBody,
};
use crate::models::outcome::{Operation, WorkflowOutcome};
use crate::models::render::RenderConfig;
use crate::services::content::ContentService;
use crate::services::manifest::ManifestBuilder;
use crate::services::registry::DialcodeRegistry;
use crate::services::renderer::ImageRenderer;
use crate::services::scheduler::{SchedulerError, TaskScheduler};
use crate::services::tracker::{BatchJobTracker, JobStatusView, StatusError, TrackerError};
use crate::services::upstream::UpstreamReply;

/// Knobs the coordinator reads from configuration.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub max_generate_count: u64,
    pub pipeline_timeout: Duration,
    /// Prefix encoded into every rendered dial code.
    pub registry_url: String,
    pub container: String,
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_generate_count: config.dialcode_generate_max_count,
            pipeline_timeout: config.pipeline_timeout(),
            registry_url: config.dial_registry_url.clone(),
            container: config.storage_container.clone(),
        }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_generate_count: 1000,
            pipeline_timeout: Duration::from_secs(300),
            registry_url: String::new(),
            container: "dial".to_string(),
        }
    }
}

/// Why the image pipeline produced no process id.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("request carries no channel")]
    MissingChannel,

    #[error("invalid render configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Images(#[from] SchedulerError),

    #[error("batch job submission failed: {0}")]
    Submit(#[from] TrackerError),

    #[error("image pipeline exceeded its {}s budget", .0.as_secs())]
    TimedOut(Duration),
}

/// Inputs to one image pipeline run.
struct PipelineRequest<'a> {
    dialcodes: Vec<String>,
    overrides: &'a Map<String, Value>,
    publisher: Option<&'a str>,
    content_id: Option<&'a str>,
}

pub struct WorkflowCoordinator {
    registry: Arc<dyn DialcodeRegistry>,
    content: Arc<dyn ContentService>,
    renderer: Arc<dyn ImageRenderer>,
    scheduler: TaskScheduler,
    tracker: BatchJobTracker,
    settings: WorkflowSettings,
}

impl WorkflowCoordinator {
    pub fn new(
        registry: Arc<dyn DialcodeRegistry>,
        content: Arc<dyn ContentService>,
        renderer: Arc<dyn ImageRenderer>,
        scheduler: TaskScheduler,
        tracker: BatchJobTracker,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            registry,
            content,
            renderer,
            scheduler,
            tracker,
            settings,
        }
    }

    /// Mint dial codes, optionally rendering them as a tracked batch.
    pub async fn generate(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Generate;
        let request = serde_json::from_value::<GenerateBody>(body)
            .ok()
            .filter(|body| body.validate().is_ok())
            .and_then(GenerateBody::into_generation_request);
        let Some(request) = request else {
            return rejected(op);
        };

        tracing::info!(
            count = request.count,
            publisher = request.publisher.as_deref().unwrap_or(""),
            images = request.qr_code_spec.is_some(),
            "Generating dial codes"
        );

        let envelope = match self
            .registry
            .generate(&request.forward, ctx)
            .await
            .and_then(|reply| reply.accept(true))
        {
            Ok(envelope) => envelope,
            Err(e) => return upstream_failure(op, e),
        };

        let codes = envelope.identifiers("dialcodes");
        let mut outcome = self
            .with_images(
                envelope.result,
                request.qr_code_spec.as_ref().map(|overrides| PipelineRequest {
                    dialcodes: codes,
                    overrides,
                    publisher: request.publisher.as_deref(),
                    content_id: None,
                }),
                ctx,
            )
            .await;

        if request.count > self.settings.max_generate_count {
            outcome = outcome.degrade(format!(
                "requested count {} exceeds maximum {}",
                request.count, self.settings.max_generate_count
            ));
        }
        finish(op, outcome)
    }

    /// List a publisher's dial codes, optionally rendering them.
    pub async fn list(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::List;
        let Some(mut request) = serde_json::from_value::<ListBody>(body)
            .ok()
            .filter(|body| body.validate().is_ok())
            .and_then(|body| body.request)
        else {
            return rejected(op);
        };
        let Some(search) = request.search.as_mut() else {
            return rejected(op);
        };

        // Render overrides are ours; the registry never sees them.
        let overrides = search.qr_code_spec.take().filter(|o| !o.is_empty());
        let publisher = search.publisher.clone();

        let forward = match serde_json::to_value(&request) {
            Ok(forward) => forward,
            Err(_) => return rejected(op),
        };

        let envelope = match self
            .registry
            .list(&forward, ctx)
            .await
            .and_then(|reply| reply.accept(true))
        {
            Ok(envelope) => envelope,
            Err(e) => return upstream_failure(op, e),
        };

        let codes = envelope.identifiers("dialcodes");
        let outcome = self
            .with_images(
                envelope.result,
                overrides.as_ref().map(|overrides| PipelineRequest {
                    dialcodes: codes,
                    overrides,
                    publisher: publisher.as_deref(),
                    content_id: None,
                }),
                ctx,
            )
            .await;
        finish(op, outcome)
    }

    pub async fn search(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Search;
        let Some(request) = required(&body, &["request", "search"]).then(|| &body["request"]) else {
            return rejected(op);
        };
        forward(op, true, self.registry.search(request, ctx).await)
    }

    pub async fn read(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Read;
        let Some(id) = lookup(&body, &["request", "dialcode", "identifier"])
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            return rejected(op);
        };
        forward(op, false, self.registry.read(id, ctx).await)
    }

    pub async fn update(&self, dialcode_id: &str, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Update;
        if dialcode_id.is_empty() || !required(&body, &["request", "dialcode"]) {
            return rejected(op);
        }
        forward(op, false, self.registry.update(dialcode_id, &body["request"], ctx).await)
    }

    pub async fn publish(&self, dialcode_id: &str, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Publish;
        if dialcode_id.is_empty() || !required(&body, &["request"]) {
            return rejected(op);
        }
        forward(op, false, self.registry.publish(dialcode_id, &body["request"], ctx).await)
    }

    pub async fn link(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::ContentLink;
        let valid = serde_json::from_value::<LinkBody>(body.clone())
            .map(|link| link.is_valid())
            .unwrap_or(false);
        if !valid {
            return rejected(op);
        }
        forward(op, false, self.registry.link(&body["request"], ctx).await)
    }

    pub async fn create_publisher(&self, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::CreatePublisher;
        let valid = serde_json::from_value::<PublisherBody>(body.clone())
            .map(|publisher| publisher.validate().is_ok())
            .unwrap_or(false);
        if !valid {
            return rejected(op);
        }
        forward(op, false, self.registry.create_publisher(&body["request"], ctx).await)
    }

    pub async fn read_publisher(&self, publisher_id: &str, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::ReadPublisher;
        if publisher_id.is_empty() {
            return rejected(op);
        }
        forward(op, false, self.registry.read_publisher(publisher_id, ctx).await)
    }

    pub async fn update_publisher(
        &self,
        publisher_id: &str,
        body: Value,
        ctx: &RequestContext,
    ) -> WorkflowOutcome {
        let op = Operation::UpdatePublisher;
        if publisher_id.is_empty() || !required(&body, &["request", "publisher"]) {
            return rejected(op);
        }
        forward(
            op,
            false,
            self.registry
                .update_publisher(publisher_id, &body["request"], ctx)
                .await,
        )
    }

    /// Reserve dial codes for a content, render them, and stamp the resulting
    /// process id back onto the content.
    pub async fn reserve(&self, content_id: &str, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Reserve;
        if content_id.is_empty() {
            return rejected(op);
        }
        let spec = serde_json::from_value::<ReserveBody>(body.clone())
            .ok()
            .and_then(|body| body.dialcodes().cloned())
            .unwrap_or_default();

        let envelope = match self
            .registry
            .reserve(content_id, &body, ctx)
            .await
            .and_then(|reply| reply.accept(false))
        {
            Ok(envelope) => envelope,
            Err(e) => return upstream_failure(op, e),
        };

        let codes = envelope.identifiers("reservedDialcodes");
        let outcome = self
            .with_images(
                envelope.result,
                spec.image_overrides().map(|overrides| PipelineRequest {
                    dialcodes: codes,
                    overrides,
                    publisher: spec.publisher.as_deref(),
                    content_id: Some(content_id),
                }),
                ctx,
            )
            .await;

        let mut result = match outcome {
            WorkflowOutcome::Success(result) => result,
            other => return finish(op, other),
        };

        let process_id = result.get("processId").and_then(Value::as_str);
        let version_key = result.get("versionKey").filter(|v| !v.is_null());
        let (Some(process_id), Some(version_key)) = (process_id, version_key) else {
            return finish(op, WorkflowOutcome::Success(result));
        };

        let patch = json!({ "versionKey": version_key, "qrCodeProcessId": process_id });
        match self.content.update_content(content_id, &patch, ctx).await {
            Ok(updated) => {
                if let Some(version_key) = updated.result.get("versionKey").filter(|v| !v.is_null()) {
                    result.insert("versionKey".to_string(), version_key.clone());
                }
                finish(op, WorkflowOutcome::Success(result))
            }
            Err(e) => {
                tracing::error!(content_id = %content_id, error = %e, "Content update after reserve failed");
                upstream_failure(op, e)
            }
        }
    }

    pub async fn release(&self, content_id: &str, body: Value, ctx: &RequestContext) -> WorkflowOutcome {
        let op = Operation::Release;
        if content_id.is_empty() {
            return rejected(op);
        }
        forward(op, false, self.registry.release(content_id, &body, ctx).await)
    }

    /// Pure read of a submitted batch.
    pub async fn batch_status(
        &self,
        process_id: &str,
        ctx: &RequestContext,
    ) -> Result<JobStatusView, StatusError> {
        self.tracker.status(ctx, process_id).await
    }

    /// Run the image pipeline when one was requested and there is something to
    /// render, attaching the process id on success.
    async fn with_images(
        &self,
        mut result: Map<String, Value>,
        pipeline: Option<PipelineRequest<'_>>,
        ctx: &RequestContext,
    ) -> WorkflowOutcome {
        let Some(pipeline) = pipeline.filter(|p| !p.dialcodes.is_empty()) else {
            return WorkflowOutcome::Success(result);
        };

        let budget = self.settings.pipeline_timeout;
        let run = tokio::time::timeout(budget, self.image_pipeline(pipeline, ctx)).await;
        match run.unwrap_or_else(|_| Err(PipelineError::TimedOut(budget))) {
            Ok(process_id) => {
                result.insert("processId".to_string(), json!(process_id.to_string()));
                WorkflowOutcome::Success(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Image pipeline failed, returning partial result");
                WorkflowOutcome::PartialSuccess {
                    result,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn image_pipeline(
        &self,
        pipeline: PipelineRequest<'_>,
        ctx: &RequestContext,
    ) -> Result<Uuid, PipelineError> {
        let channel = ctx.channel.as_deref().ok_or(PipelineError::MissingChannel)?;
        let config = RenderConfig::merged(pipeline.overrides)?;

        let shared = Arc::new(config.clone());
        let owner = (channel.to_string(), pipeline.publisher.map(str::to_string));
        let outcome = self
            .scheduler
            .run(pipeline.dialcodes, |code| {
                let renderer = Arc::clone(&self.renderer);
                let config = Arc::clone(&shared);
                let (channel, publisher) = owner.clone();
                async move {
                    renderer
                        .render(&code, &config, &channel, publisher.as_deref())
                        .await
                }
            })
            .await;
        let images = outcome.into_result()?;

        let manifest = ManifestBuilder::new(
            self.content.as_ref(),
            &self.settings.registry_url,
            &self.settings.container,
        )
        .build(images, config, channel, pipeline.publisher, pipeline.content_id, ctx)
        .await;

        Ok(self
            .tracker
            .submit(manifest, channel, pipeline.publisher, ctx)
            .await?)
    }
}

/// True when the value at `path` exists and is not null.
fn required(body: &Value, path: &[&str]) -> bool {
    lookup(body, path).is_some()
}

fn rejected(op: Operation) -> WorkflowOutcome {
    tracing::warn!(operation = %op, "Required params are missing");
    WorkflowOutcome::ClientError(ClientError::missing_params(op))
}

fn upstream_failure(op: Operation, error: UpstreamError) -> WorkflowOutcome {
    tracing::error!(
        operation = %op,
        status = ?error.status,
        err = error.err.as_deref().unwrap_or(""),
        detail = %error.detail,
        "Upstream call failed"
    );
    WorkflowOutcome::UpstreamError(error)
}

/// Single registry call passthrough.
fn forward(
    op: Operation,
    allow_partial: bool,
    reply: Result<UpstreamReply, UpstreamError>,
) -> WorkflowOutcome {
    match reply.and_then(|reply| reply.accept(allow_partial)) {
        Ok(envelope) => WorkflowOutcome::Success(envelope.result),
        Err(e) => upstream_failure(op, e),
    }
}

fn finish(op: Operation, outcome: WorkflowOutcome) -> WorkflowOutcome {
    if let WorkflowOutcome::PartialSuccess { reason, .. } = &outcome {
        metrics::counter!("dialcode_workflow_partial_success_total", "operation" => op.to_string())
            .increment(1);
        tracing::info!(operation = %op, reason = %reason, "Workflow finished with partial success");
    }
    outcome
}
