use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};
use uuid::Uuid;

use crate::models::context::RequestContext;

pub const API_VERSION: &str = "3.0";

/// Platform-wide response code carried in every envelope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseCode {
    #[default]
    Ok,
    PartialSuccess,
    ClientError,
    ServerError,
    ResourceNotFound,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resmsgid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msgid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
}

/// Response envelope shared by this service and its upstream collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default)]
    pub params: ResponseParams,
    #[serde(rename = "responseCode", default)]
    pub response_code: ResponseCode,
    #[serde(default)]
    pub result: Map<String, Value>,
}

impl ApiEnvelope {
    pub fn success(api_id: &str, ctx: &RequestContext, result: Map<String, Value>) -> Self {
        Self::stamped(api_id, ctx, ResponseCode::Ok, "successful", result)
    }

    pub fn error(
        api_id: &str,
        ctx: &RequestContext,
        response_code: ResponseCode,
        err: impl Into<String>,
        errmsg: impl Into<String>,
        result: Map<String, Value>,
    ) -> Self {
        let mut envelope = Self::stamped(api_id, ctx, response_code, "failed", result);
        envelope.params.err = Some(err.into());
        envelope.params.errmsg = Some(errmsg.into());
        envelope
    }

    fn stamped(
        api_id: &str,
        ctx: &RequestContext,
        response_code: ResponseCode,
        status: &str,
        result: Map<String, Value>,
    ) -> Self {
        Self {
            id: api_id.to_string(),
            ver: API_VERSION.to_string(),
            ts: Some(Utc::now().to_rfc3339()),
            params: ResponseParams {
                resmsgid: Some(Uuid::new_v4().to_string()),
                msgid: ctx.request_id.clone(),
                status: Some(status.to_string()),
                err: None,
                errmsg: None,
            },
            response_code,
            result,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.response_code == ResponseCode::Ok
    }

    pub fn is_ok_or_partial(&self) -> bool {
        matches!(
            self.response_code,
            ResponseCode::Ok | ResponseCode::PartialSuccess
        )
    }

    /// String identifiers under `result[key]`, accepting either bare strings or
    /// objects carrying an `identifier` field.
    pub fn identifiers(&self, key: &str) -> Vec<String> {
        self.result
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        Value::Object(obj) => obj
                            .get("identifier")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
