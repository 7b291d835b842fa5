//! Manifest Builder: turns keyed image results into a storage manifest.

use chrono::Utc;

use crate::models::context::RequestContext;
use crate::models::manifest::{storage_path, ImageResults, Manifest, ManifestEntry, StorageDescriptor};
use crate::models::render::RenderConfig;
use crate::services::content::{ContentMeta, ContentService};

const CONTENT_FIELDS: &[&str] = &["medium", "subject", "gradeLevel"];

pub struct ManifestBuilder<'a> {
    content: &'a dyn ContentService,
    registry_url: &'a str,
    container: &'a str,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(content: &'a dyn ContentService, registry_url: &'a str, container: &'a str) -> Self {
        Self {
            content,
            registry_url,
            container,
        }
    }

    /// Build the manifest. A failed content lookup only drops the archive filename.
    pub async fn build(
        &self,
        images: ImageResults,
        config: RenderConfig,
        channel: &str,
        publisher: Option<&str>,
        content_id: Option<&str>,
        ctx: &RequestContext,
    ) -> Manifest {
        let dialcodes = images
            .into_iter()
            .map(|(code, artifact)| ManifestEntry {
                data: format!("{}{}", self.registry_url, code),
                text: code,
                id: artifact,
            })
            .collect();

        let file_name = match content_id {
            Some(content_id) => {
                match self.content.get_content(content_id, CONTENT_FIELDS, ctx).await {
                    Ok(meta) => Some(archive_file_name(
                        content_id,
                        &meta,
                        Utc::now().timestamp_millis(),
                    )),
                    Err(e) => {
                        tracing::warn!(
                            content_id = %content_id,
                            error = %e,
                            "Content lookup failed, manifest built without archive name"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Manifest {
            dialcodes,
            object_id: content_id.unwrap_or(channel).to_string(),
            config,
            storage: StorageDescriptor {
                container: self.container.to_string(),
                path: storage_path(channel, publisher),
                file_name,
            },
        }
    }
}

/// `{contentId}_{medium}_{gradeLevels...}_{subject}_{millis}`, skipping empty parts.
pub fn archive_file_name(content_id: &str, meta: &ContentMeta, millis: i64) -> String {
    let millis = millis.to_string();
    let parts: Vec<&str> = std::iter::once(content_id)
        .chain(meta.medium.0.iter().map(String::as_str))
        .chain(meta.grade_level.0.iter().map(String::as_str))
        .chain(meta.subject.0.iter().map(String::as_str))
        .chain(std::iter::once(millis.as_str()))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    parts.join("_")
}
