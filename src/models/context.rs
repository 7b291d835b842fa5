use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use std::convert::Infallible;

pub const CHANNEL_HEADER: &str = "x-channel-id";

/// Headers relayed verbatim to upstream collaborators.
const FORWARDED_HEADERS: &[&str] = &[
    "authorization",
    "x-authenticated-user-token",
    "x-channel-id",
    "x-app-id",
    "x-device-id",
];

/// Per-request context threaded through every workflow and upstream call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub channel: Option<String>,
    pub request_id: Option<String>,
    pub forwarded: Vec<(String, String)>,
}

impl RequestContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let forwarded = FORWARDED_HEADERS
            .iter()
            .filter_map(|name| get(name).map(|value| (name.to_string(), value)))
            .collect();

        Self {
            channel: get(CHANNEL_HEADER),
            request_id: get("x-request-id").or_else(|| get("msgid")),
            forwarded,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        let channel = channel.into();
        self.forwarded
            .retain(|(name, _)| name.as_str() != CHANNEL_HEADER);
        self.forwarded
            .push((CHANNEL_HEADER.to_string(), channel.clone()));
        self.channel = Some(channel);
        self
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
