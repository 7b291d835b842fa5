use serde_json::{Map, Value};

use crate::models::envelope::{ApiEnvelope, ResponseCode};
use crate::models::outcome::Operation;

/// Caller supplied a missing or malformed field. Never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
}

impl ClientError {
    pub fn missing_params(op: Operation) -> Self {
        Self {
            code: op.missing_params_code(),
            message: format!("Required fields for {} are missing or invalid", op.label()),
        }
    }
}

/// A collaborator call failed or answered with a non-success response code.
///
/// Carries whatever the upstream reported so it can be relayed unchanged.
#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream call failed (status {status:?}): {detail}")]
pub struct UpstreamError {
    pub status: Option<u16>,
    pub err: Option<String>,
    pub errmsg: Option<String>,
    pub response_code: Option<ResponseCode>,
    pub result: Option<Map<String, Value>>,
    pub detail: String,
}

impl UpstreamError {
    /// The call never produced a usable response.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            err: None,
            errmsg: None,
            response_code: None,
            result: None,
            detail: detail.into(),
        }
    }

    /// The upstream answered, but not with an accepted response code.
    pub fn rejected(status: u16, envelope: ApiEnvelope) -> Self {
        let detail = format!(
            "responseCode {} ({})",
            envelope.response_code,
            envelope.params.errmsg.as_deref().unwrap_or("no message")
        );
        Self {
            status: Some(status),
            err: envelope.params.err,
            errmsg: envelope.params.errmsg,
            response_code: Some(envelope.response_code),
            result: (!envelope.result.is_empty()).then_some(envelope.result),
            detail,
        }
    }

    /// Upstream status when it is a valid HTTP status, else 500.
    pub fn http_status(&self) -> u16 {
        self.status
            .filter(|s| (100..600).contains(s))
            .unwrap_or(500)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        let mut error = Self::transport(e.to_string());
        error.status = e.status().map(|s| s.as_u16());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::ResponseParams;
    use serde_json::json;

    #[test]
    fn test_rejected_keeps_upstream_details() {
        let envelope = ApiEnvelope {
            params: ResponseParams {
                err: Some("ERR_CONTENT_NOT_FOUND".to_string()),
                errmsg: Some("content missing".to_string()),
                ..Default::default()
            },
            response_code: ResponseCode::ResourceNotFound,
            result: json!({"count": 0}).as_object().cloned().unwrap(),
            ..Default::default()
        };
        let error = UpstreamError::rejected(404, envelope);
        assert_eq!(error.http_status(), 404);
        assert_eq!(error.err.as_deref(), Some("ERR_CONTENT_NOT_FOUND"));
        assert_eq!(error.response_code, Some(ResponseCode::ResourceNotFound));
        assert!(error.result.is_some());
    }

    #[test]
    fn test_invalid_status_falls_back_to_500() {
        assert_eq!(UpstreamError::transport("connection reset").http_status(), 500);
        let mut error = UpstreamError::transport("odd");
        error.status = Some(42);
        assert_eq!(error.http_status(), 500);
    }

    #[test]
    fn test_missing_params_code() {
        let error = ClientError::missing_params(Operation::Generate);
        assert_eq!(error.code, "ERR_DIALCODE_GENERATE_MISSING_PARAMS");
    }
}
