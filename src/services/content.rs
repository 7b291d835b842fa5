use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::UpstreamError;
use crate::models::context::RequestContext;
use crate::models::envelope::ApiEnvelope;
use crate::services::upstream::UpstreamClient;

/// Descriptive content fields used to name a batch archive.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentMeta {
    #[serde(default)]
    pub medium: TextList,
    #[serde(default)]
    pub subject: TextList,
    #[serde(default)]
    pub grade_level: TextList,
}

/// A content field that may be a single string or a list of strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextList(pub Vec<String>);

impl<'de> Deserialize<'de> for TextList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
            Some(OneOrMany::One(s)) => TextList(vec![s]),
            Some(OneOrMany::Many(v)) => TextList(v),
            None => TextList::default(),
        })
    }
}

/// Content metadata collaborator.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn get_content(
        &self,
        content_id: &str,
        fields: &[&str],
        ctx: &RequestContext,
    ) -> Result<ContentMeta, UpstreamError>;

    /// Apply a patch to the content record; the reply carries the new `versionKey`.
    async fn update_content(
        &self,
        content_id: &str,
        patch: &Value,
        ctx: &RequestContext,
    ) -> Result<ApiEnvelope, UpstreamError>;
}

pub struct ContentClient {
    upstream: UpstreamClient,
}

impl ContentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        Ok(Self {
            upstream: UpstreamClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl ContentService for ContentClient {
    async fn get_content(
        &self,
        content_id: &str,
        fields: &[&str],
        ctx: &RequestContext,
    ) -> Result<ContentMeta, UpstreamError> {
        let fields = fields.join(",");
        let envelope = self
            .upstream
            .send(
                Method::GET,
                &format!("content/v3/read/{content_id}"),
                ctx,
                &[("mode", "edit"), ("fields", fields.as_str())],
                None,
            )
            .await?
            .accept(false)?;

        let content = envelope.result.get("content").cloned().unwrap_or(Value::Null);
        serde_json::from_value(content)
            .map_err(|e| UpstreamError::transport(format!("malformed content metadata: {e}")))
    }

    async fn update_content(
        &self,
        content_id: &str,
        patch: &Value,
        ctx: &RequestContext,
    ) -> Result<ApiEnvelope, UpstreamError> {
        let body = json!({ "request": { "content": patch } });
        self.upstream
            .send(
                Method::PATCH,
                &format!("content/v3/update/{content_id}"),
                ctx,
                &[],
                Some(&body),
            )
            .await?
            .accept(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_meta_shapes() {
        let meta: ContentMeta = serde_json::from_value(json!({
            "medium": "English",
            "gradeLevel": ["Class 1", "Class 2"],
            "subject": null,
            "name": "ignored"
        }))
        .unwrap();

        assert_eq!(meta.medium.0, vec!["English"]);
        assert_eq!(meta.grade_level.0, vec!["Class 1", "Class 2"]);
        assert!(meta.subject.0.is_empty());
    }

    #[test]
    fn test_content_meta_empty() {
        let meta: ContentMeta = serde_json::from_value(json!({})).unwrap();
        assert_eq!(meta, ContentMeta::default());
    }
}
