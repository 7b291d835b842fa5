use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::render::RenderConfig;

/// Dial code identifier → stored artifact key, one entry per successful render.
pub type ImageResults = BTreeMap<String, String>;

/// One rendered dial code inside a batch manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    /// Resolution URL encoded into the image.
    pub data: String,
    /// Human-readable text printed under the code.
    pub text: String,
    /// Artifact key produced by the renderer.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageDescriptor {
    pub container: String,
    pub path: String,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Complete description of one image batch submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub dialcodes: Vec<ManifestEntry>,
    #[serde(rename = "objectId")]
    pub object_id: String,
    pub config: RenderConfig,
    pub storage: StorageDescriptor,
}

impl Manifest {
    pub fn image_count(&self) -> usize {
        self.dialcodes.len()
    }

    /// Key the archived manifest is written under.
    pub fn archive_key(&self, fallback_name: &str) -> String {
        let name = self.storage.file_name.as_deref().unwrap_or(fallback_name);
        format!("{}{}.json", self.storage.path, name)
    }
}

/// `channel/` without a publisher, `channel/publisher/` with one.
pub fn storage_path(channel: &str, publisher: Option<&str>) -> String {
    match publisher.filter(|p| !p.is_empty()) {
        Some(publisher) => format!("{channel}/{publisher}/"),
        None => format!("{channel}/"),
    }
}
