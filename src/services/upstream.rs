//! Shared HTTP plumbing for the registry and content collaborators.

use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::models::context::RequestContext;
use crate::models::envelope::ApiEnvelope;

/// A decoded upstream answer, before its response code is judged.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub envelope: ApiEnvelope,
}

impl UpstreamReply {
    pub fn ok(envelope: ApiEnvelope) -> Self {
        Self {
            status: 200,
            envelope,
        }
    }

    /// Accept `OK`, or also `PARTIAL_SUCCESS` when `allow_partial` is set.
    pub fn accept(self, allow_partial: bool) -> Result<ApiEnvelope, UpstreamError> {
        let accepted = if allow_partial {
            self.envelope.is_ok_or_partial()
        } else {
            self.envelope.is_ok()
        };
        if accepted {
            Ok(self.envelope)
        } else {
            Err(UpstreamError::rejected(self.status, self.envelope))
        }
    }
}

/// Thin JSON-over-HTTP client bound to one base URL.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dialcode-service/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Send a JSON request and decode the envelope, whatever the HTTP status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        ctx: &RequestContext,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<UpstreamReply, UpstreamError> {
        let url = self.url(path);
        let mut request = self.http.request(method.clone(), &url).query(query);
        for (name, value) in &ctx.forwarded {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();

        tracing::debug!(
            method = %method,
            url = %url,
            status = status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Upstream call finished"
        );

        let text = response.text().await?;
        match serde_json::from_str::<ApiEnvelope>(&text) {
            Ok(envelope) => Ok(UpstreamReply { status, envelope }),
            Err(e) => {
                let mut error =
                    UpstreamError::transport(format!("undecodable response from {url}: {e}"));
                error.status = Some(status);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::envelope::ResponseCode;

    fn reply(code: ResponseCode) -> UpstreamReply {
        UpstreamReply {
            status: 200,
            envelope: ApiEnvelope {
                response_code: code,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_accept_partial_only_when_allowed() {
        assert!(reply(ResponseCode::PartialSuccess).accept(true).is_ok());
        assert!(reply(ResponseCode::PartialSuccess).accept(false).is_err());
        assert!(reply(ResponseCode::Ok).accept(false).is_ok());
    }

    #[test]
    fn test_rejected_reply_keeps_status() {
        let mut r = reply(ResponseCode::ClientError);
        r.status = 400;
        let error = r.accept(true).unwrap_err();
        assert_eq!(error.http_status(), 400);
    }

    #[test]
    fn test_url_join() {
        let client = UpstreamClient::new("http://registry:9000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url("/dialcode/v3/generate"),
            "http://registry:9000/dialcode/v3/generate"
        );
    }
}
