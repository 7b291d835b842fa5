use axum::http::StatusCode;
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

use crate::error::{ClientError, UpstreamError};
use crate::models::context::RequestContext;
use crate::models::envelope::{ApiEnvelope, ResponseCode};

/// Every externally visible dial code operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Generate,
    List,
    Search,
    Read,
    Update,
    Publish,
    ContentLink,
    ProcessStatus,
    Reserve,
    Release,
    CreatePublisher,
    ReadPublisher,
    UpdatePublisher,
}

impl Operation {
    pub fn api_id(&self) -> String {
        format!("api.dialcode.{}", self.as_ref().replace('_', "."))
    }

    pub fn label(&self) -> String {
        self.as_ref().replace('_', " ")
    }

    /// Error code used when the upstream reports none.
    pub fn failed_code(&self) -> String {
        format!("ERR_DIALCODE_{}", self.as_ref().to_uppercase())
    }

    pub fn missing_params_code(&self) -> String {
        format!("{}_MISSING_PARAMS", self.failed_code())
    }
}

/// Result of one workflow invocation. Stages return one of these and the
/// coordinator folds them; nothing is decided from ad hoc status fields.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    Success(Map<String, Value>),
    /// The primary call succeeded, a dependent step did not.
    PartialSuccess {
        result: Map<String, Value>,
        reason: String,
    },
    ClientError(ClientError),
    UpstreamError(UpstreamError),
}

impl WorkflowOutcome {
    /// Downgrade a success to partial success. Other outcomes are unchanged;
    /// an existing partial keeps its first reason.
    pub fn degrade(self, reason: impl Into<String>) -> Self {
        match self {
            WorkflowOutcome::Success(result) => WorkflowOutcome::PartialSuccess {
                result,
                reason: reason.into(),
            },
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowOutcome::Success(_) => StatusCode::OK,
            WorkflowOutcome::PartialSuccess { .. } => StatusCode::MULTI_STATUS,
            WorkflowOutcome::ClientError(_) => StatusCode::BAD_REQUEST,
            WorkflowOutcome::UpstreamError(e) => StatusCode::from_u16(e.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn result(&self) -> Option<&Map<String, Value>> {
        match self {
            WorkflowOutcome::Success(result) | WorkflowOutcome::PartialSuccess { result, .. } => {
                Some(result)
            }
            WorkflowOutcome::UpstreamError(e) => e.result.as_ref(),
            WorkflowOutcome::ClientError(_) => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, WorkflowOutcome::PartialSuccess { .. })
    }

    pub fn into_envelope(self, op: Operation, ctx: &RequestContext) -> ApiEnvelope {
        let api_id = op.api_id();
        match self {
            WorkflowOutcome::Success(result) => ApiEnvelope::success(&api_id, ctx, result),
            WorkflowOutcome::PartialSuccess { result, .. } => {
                let mut envelope = ApiEnvelope::success(&api_id, ctx, result);
                envelope.response_code = ResponseCode::PartialSuccess;
                envelope
            }
            WorkflowOutcome::ClientError(e) => ApiEnvelope::error(
                &api_id,
                ctx,
                ResponseCode::ClientError,
                e.code,
                e.message,
                Map::new(),
            ),
            WorkflowOutcome::UpstreamError(e) => ApiEnvelope::error(
                &api_id,
                ctx,
                e.response_code
                    .filter(|code| *code != ResponseCode::Unknown)
                    .unwrap_or(ResponseCode::ServerError),
                e.err.unwrap_or_else(|| op.failed_code()),
                e.errmsg.unwrap_or_else(|| format!("{} failed", op.label())),
                e.result.unwrap_or_default(),
            ),
        }
    }
}
