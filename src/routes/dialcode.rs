//! `/dialcode/v3` handlers. Each one builds the request context, runs one
//! coordinator workflow and renders its outcome as an envelope.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::app_state::AppState;
use crate::models::context::RequestContext;
use crate::models::envelope::{ApiEnvelope, ResponseCode};
use crate::models::outcome::{Operation, WorkflowOutcome};
use crate::services::tracker::{JobStatusView, StatusError};

/// A workflow outcome ready to be written back to the caller.
pub struct Reply {
    op: Operation,
    ctx: RequestContext,
    outcome: WorkflowOutcome,
}

impl Reply {
    pub fn new(op: Operation, ctx: RequestContext, outcome: WorkflowOutcome) -> Self {
        Self { op, ctx, outcome }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = self.outcome.status_code();
        let envelope = self.outcome.into_envelope(self.op, &self.ctx);
        (status, Json(envelope)).into_response()
    }
}

/// Decode a JSON body leniently; anything unparseable becomes `null` and is
/// rejected by the workflow's own validation.
fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// POST /dialcode/v3/generate
pub async fn generate(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> Reply {
    let outcome = state.coordinator.generate(parse_body(&body), &ctx).await;
    Reply::new(Operation::Generate, ctx, outcome)
}

/// POST /dialcode/v3/list
pub async fn list(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> Reply {
    let outcome = state.coordinator.list(parse_body(&body), &ctx).await;
    Reply::new(Operation::List, ctx, outcome)
}

/// POST /dialcode/v3/search
pub async fn search(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> Reply {
    let outcome = state.coordinator.search(parse_body(&body), &ctx).await;
    Reply::new(Operation::Search, ctx, outcome)
}

/// POST /dialcode/v3/read
pub async fn read(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> Reply {
    let outcome = state.coordinator.read(parse_body(&body), &ctx).await;
    Reply::new(Operation::Read, ctx, outcome)
}

/// PATCH /dialcode/v3/update/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(dialcode_id): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .update(&dialcode_id, parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::Update, ctx, outcome)
}

/// POST /dialcode/v3/publish/{id}
pub async fn publish(
    State(state): State<AppState>,
    Path(dialcode_id): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .publish(&dialcode_id, parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::Publish, ctx, outcome)
}

/// POST /dialcode/v3/content/link
pub async fn link(State(state): State<AppState>, ctx: RequestContext, body: Bytes) -> Reply {
    let outcome = state.coordinator.link(parse_body(&body), &ctx).await;
    Reply::new(Operation::ContentLink, ctx, outcome)
}

/// POST /dialcode/v3/reserve/{content_id}
pub async fn reserve(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .reserve(&content_id, parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::Reserve, ctx, outcome)
}

/// POST /dialcode/v3/release/{content_id}
pub async fn release(
    State(state): State<AppState>,
    Path(content_id): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .release(&content_id, parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::Release, ctx, outcome)
}

/// POST /dialcode/v3/publisher/create
pub async fn create_publisher(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .create_publisher(parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::CreatePublisher, ctx, outcome)
}

/// GET /dialcode/v3/publisher/read/{id}
pub async fn read_publisher(
    State(state): State<AppState>,
    Path(publisher_id): Path<String>,
    ctx: RequestContext,
) -> Reply {
    let outcome = state.coordinator.read_publisher(&publisher_id, &ctx).await;
    Reply::new(Operation::ReadPublisher, ctx, outcome)
}

/// PATCH /dialcode/v3/publisher/update/{id}
pub async fn update_publisher(
    State(state): State<AppState>,
    Path(publisher_id): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Reply {
    let outcome = state
        .coordinator
        .update_publisher(&publisher_id, parse_body(&body), &ctx)
        .await;
    Reply::new(Operation::UpdatePublisher, ctx, outcome)
}

/// GET /dialcode/v3/process/status/{process_id}
pub async fn process_status(
    State(state): State<AppState>,
    Path(process_id): Path<String>,
    ctx: RequestContext,
) -> Response {
    status_response(state.coordinator.batch_status(&process_id, &ctx).await, &process_id, &ctx)
}

/// Render a status read. Failed jobs relay their stored code and body as-is.
pub fn status_response(
    status: Result<JobStatusView, StatusError>,
    process_id: &str,
    ctx: &RequestContext,
) -> Response {
    let op = Operation::ProcessStatus;
    match status {
        Ok(view) => (http_status(view.code), Json(view.data)).into_response(),
        Err(StatusError::Failed { code, data }) => (http_status(code), Json(data)).into_response(),
        Err(StatusError::NotFound(_)) => {
            let mut result = Map::new();
            result.insert("processId".to_string(), json!(process_id));
            let envelope = ApiEnvelope::error(
                &op.api_id(),
                ctx,
                ResponseCode::ResourceNotFound,
                "ERR_PROCESS_ID_NOT_FOUND",
                format!("Process {process_id} not found"),
                result,
            );
            (StatusCode::NOT_FOUND, Json(envelope)).into_response()
        }
        Err(StatusError::Store(e)) => {
            tracing::error!(process_id = %process_id, error = %e, "Batch status lookup failed");
            let envelope = ApiEnvelope::error(
                &op.api_id(),
                ctx,
                ResponseCode::ServerError,
                op.failed_code(),
                "Unable to read process status",
                Map::new(),
            );
            (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
        }
    }
}

fn http_status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
