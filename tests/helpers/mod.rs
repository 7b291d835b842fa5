//! In-memory collaborators for driving the workflow coordinator in tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dialcode_service::error::UpstreamError;
use dialcode_service::models::context::RequestContext;
use dialcode_service::models::envelope::{ApiEnvelope, ResponseCode, ResponseParams};
use dialcode_service::models::render::RenderConfig;
use dialcode_service::services::content::{ContentMeta, ContentService, TextList};
use dialcode_service::services::queue::QueuedBatch;
use dialcode_service::services::registry::DialcodeRegistry;
use dialcode_service::services::renderer::{artifact_key, ImageRenderer, RenderError};
use dialcode_service::services::scheduler::TaskScheduler;
use dialcode_service::services::storage::{ArtifactStore, StorageError};
use dialcode_service::services::tracker::{
    BatchJobTracker, JobDispatcher, MemoryJobStore, TrackerError,
};
use dialcode_service::services::upstream::UpstreamReply;
use dialcode_service::services::workflow::{WorkflowCoordinator, WorkflowSettings};

pub const CHANNEL: &str = "channel-01";
pub const REGISTRY_URL: &str = "https://dial.example/dial/";

pub fn ctx() -> RequestContext {
    RequestContext::default().with_channel(CHANNEL)
}

pub fn codes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Q{i:05}")).collect()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn ok_reply(result: Value) -> UpstreamReply {
    UpstreamReply::ok(ApiEnvelope {
        id: "api.registry".to_string(),
        ver: "3.0".to_string(),
        response_code: ResponseCode::Ok,
        result: object(result),
        ..Default::default()
    })
}

pub fn error_reply(status: u16, code: ResponseCode, err: &str) -> UpstreamReply {
    UpstreamReply {
        status,
        envelope: ApiEnvelope {
            params: ResponseParams {
                status: Some("failed".to_string()),
                err: Some(err.to_string()),
                errmsg: Some(format!("{err} from fake")),
                ..Default::default()
            },
            response_code: code,
            ..Default::default()
        },
    }
}

/// Registry that mints sequential codes and records every call.
#[derive(Default)]
pub struct FakeRegistry {
    pub calls: Mutex<Vec<(String, Value)>>,
    /// Forced reply for every call, when set.
    pub fail_with: Option<UpstreamReply>,
    /// Codes returned by list calls.
    pub listed: usize,
    pub version_key: Option<String>,
}

impl FakeRegistry {
    pub fn failing(reply: UpstreamReply) -> Self {
        Self {
            fail_with: Some(reply),
            ..Default::default()
        }
    }

    pub fn calls_to(&self, op: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn answer(&self, op: &str, payload: Value, result: Value) -> Result<UpstreamReply, UpstreamError> {
        self.calls.lock().unwrap().push((op.to_string(), payload));
        match &self.fail_with {
            Some(reply) => Ok(reply.clone()),
            None => Ok(ok_reply(result)),
        }
    }
}

#[async_trait]
impl DialcodeRegistry for FakeRegistry {
    async fn generate(&self, request: &Value, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        let count = request["dialcodes"]["count"].as_u64().unwrap_or(0) as usize;
        let minted = codes(count);
        self.answer(
            "generate",
            request.clone(),
            json!({"count": minted.len(), "dialcodes": minted, "batchcode": "batch-1"}),
        )
    }

    async fn list(&self, request: &Value, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        let listed: Vec<Value> = codes(self.listed)
            .into_iter()
            .map(|code| json!({"identifier": code, "status": "Draft"}))
            .collect();
        self.answer("list", request.clone(), json!({"count": listed.len(), "dialcodes": listed}))
    }

    async fn search(&self, request: &Value, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        self.answer("search", request.clone(), json!({"count": 0, "dialcodes": []}))
    }

    async fn read(&self, dialcode_id: &str, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        self.answer(
            "read",
            json!(dialcode_id),
            json!({"dialcode": {"identifier": dialcode_id}}),
        )
    }

    async fn update(
        &self,
        dialcode_id: &str,
        request: &Value,
        _ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.answer("update", json!({"id": dialcode_id, "request": request}), json!({"identifier": dialcode_id}))
    }

    async fn publish(
        &self,
        dialcode_id: &str,
        request: &Value,
        _ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.answer("publish", json!({"id": dialcode_id, "request": request}), json!({"identifier": dialcode_id}))
    }

    async fn link(&self, request: &Value, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        self.answer("link", request.clone(), json!({}))
    }

    async fn reserve(
        &self,
        content_id: &str,
        body: &Value,
        _ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        let count = body["request"]["dialcodes"]["count"].as_u64().unwrap_or(0) as usize;
        let mut result = json!({
            "count": count,
            "node_id": content_id,
            "reservedDialcodes": codes(count),
        });
        if let Some(version_key) = &self.version_key {
            result["versionKey"] = json!(version_key);
        }
        self.answer("reserve", json!({"id": content_id, "body": body}), result)
    }

    async fn release(
        &self,
        content_id: &str,
        body: &Value,
        _ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.answer("release", json!({"id": content_id, "body": body}), json!({"node_id": content_id}))
    }

    async fn create_publisher(&self, request: &Value, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        let id = request["publisher"]["identifier"].clone();
        self.answer("create_publisher", request.clone(), json!({"identifier": id}))
    }

    async fn read_publisher(&self, publisher_id: &str, _ctx: &RequestContext) -> Result<UpstreamReply, UpstreamError> {
        self.answer(
            "read_publisher",
            json!(publisher_id),
            json!({"publisher": {"identifier": publisher_id}}),
        )
    }

    async fn update_publisher(
        &self,
        publisher_id: &str,
        request: &Value,
        _ctx: &RequestContext,
    ) -> Result<UpstreamReply, UpstreamError> {
        self.answer(
            "update_publisher",
            json!({"id": publisher_id, "request": request}),
            json!({"identifier": publisher_id}),
        )
    }
}

/// Content service with canned metadata and a recorded update log.
pub struct FakeContent {
    pub meta: Option<ContentMeta>,
    pub update_error: Option<UpstreamError>,
    pub updates: Mutex<Vec<(String, Value)>>,
}

impl Default for FakeContent {
    fn default() -> Self {
        Self {
            meta: Some(ContentMeta {
                medium: TextList(vec!["English".to_string()]),
                subject: TextList(vec!["Mathematics".to_string()]),
                grade_level: TextList(vec!["Class 1".to_string()]),
            }),
            update_error: None,
            updates: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContentService for FakeContent {
    async fn get_content(
        &self,
        _content_id: &str,
        _fields: &[&str],
        _ctx: &RequestContext,
    ) -> Result<ContentMeta, UpstreamError> {
        self.meta
            .clone()
            .ok_or_else(|| UpstreamError::transport("content service unavailable"))
    }

    async fn update_content(
        &self,
        content_id: &str,
        patch: &Value,
        _ctx: &RequestContext,
    ) -> Result<ApiEnvelope, UpstreamError> {
        self.updates
            .lock()
            .unwrap()
            .push((content_id.to_string(), patch.clone()));
        if let Some(e) = &self.update_error {
            return Err(e.clone());
        }
        Ok(ApiEnvelope {
            result: object(json!({"node_id": content_id, "versionKey": "vk-2"})),
            ..Default::default()
        })
    }
}

/// Renderer that tracks concurrency and fails on chosen codes.
#[derive(Default)]
pub struct FakeRenderer {
    pub fail_on: HashSet<String>,
    pub delay: Option<Duration>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    pub rendered: Mutex<Vec<String>>,
}

impl FakeRenderer {
    pub fn failing_on(codes: &[&str]) -> Self {
        Self {
            fail_on: codes.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn render_count(&self) -> usize {
        self.rendered.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageRenderer for FakeRenderer {
    async fn render(
        &self,
        dialcode: &str,
        config: &RenderConfig,
        channel: &str,
        publisher: Option<&str>,
    ) -> Result<String, RenderError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on.contains(dialcode) {
            return Err(RenderError::Rejected(502));
        }
        self.rendered.lock().unwrap().push(dialcode.to_string());
        Ok(artifact_key(dialcode, config, channel, publisher))
    }
}

/// Dispatcher that remembers what it was handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<QueuedBatch>>,
}

impl RecordingDispatcher {
    pub fn take(&self) -> Vec<QueuedBatch> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &QueuedBatch) -> Result<(), TrackerError> {
        self.sent.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Object storage kept in a map.
#[derive(Default)]
pub struct MemoryArtifactStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }
}

/// A coordinator wired to fakes, with handles to every fake.
pub struct Harness {
    pub coordinator: WorkflowCoordinator,
    pub registry: Arc<FakeRegistry>,
    pub content: Arc<FakeContent>,
    pub renderer: Arc<FakeRenderer>,
    pub store: Arc<MemoryJobStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

pub struct HarnessBuilder {
    registry: FakeRegistry,
    content: FakeContent,
    renderer: FakeRenderer,
    scheduler: TaskScheduler,
    settings: WorkflowSettings,
}

impl HarnessBuilder {
    pub fn registry(mut self, registry: FakeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn content(mut self, content: FakeContent) -> Self {
        self.content = content;
        self
    }

    pub fn renderer(mut self, renderer: FakeRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn scheduler(mut self, scheduler: TaskScheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn max_count(mut self, max: u64) -> Self {
        self.settings.max_generate_count = max;
        self
    }

    pub fn pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.settings.pipeline_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let registry = Arc::new(self.registry);
        let content = Arc::new(self.content);
        let renderer = Arc::new(self.renderer);
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());

        let tracker = BatchJobTracker::new(store.clone(), dispatcher.clone());
        let coordinator = WorkflowCoordinator::new(
            registry.clone(),
            content.clone(),
            renderer.clone(),
            self.scheduler,
            tracker,
            self.settings,
        );

        Harness {
            coordinator,
            registry,
            content,
            renderer,
            store,
            dispatcher,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            registry: FakeRegistry::default(),
            content: FakeContent::default(),
            renderer: FakeRenderer::default(),
            scheduler: TaskScheduler::new(4, Duration::from_secs(5)),
            settings: WorkflowSettings {
                max_generate_count: 1000,
                pipeline_timeout: Duration::from_secs(30),
                registry_url: REGISTRY_URL.to_string(),
                container: "dial".to_string(),
            },
        }
    }

    pub fn new() -> Self {
        Self::builder().build()
    }
}

pub fn generate_body(count: u64, qr_code_spec: Option<Value>) -> Value {
    let mut dialcodes = json!({"count": count, "publisher": "pub1"});
    if let Some(spec) = qr_code_spec {
        dialcodes["qrCodeSpec"] = spec;
    }
    json!({"request": {"dialcodes": dialcodes}})
}
