//! Request bodies accepted by the dial code workflows.
//!
//! Bodies are decoded leniently (every field optional) and then checked with
//! `garde`, so that a missing field is reported with the operation's own error
//! code rather than a generic deserialization rejection.

use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Largest integer a JSON number can carry without losing precision.
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerateBody {
    #[garde(required, dive)]
    pub request: Option<GenerateRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerateRequest {
    #[garde(required, dive)]
    pub dialcodes: Option<DialcodeSpec>,

    #[serde(flatten)]
    #[garde(skip)]
    pub extra: Map<String, Value>,
}

/// `request.dialcodes` of a generate or reserve call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DialcodeSpec {
    #[garde(required, range(min = 1, max = MAX_SAFE_INTEGER))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[garde(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[garde(skip)]
    #[serde(rename = "qrCodeSpec", default, skip_serializing_if = "Option::is_none")]
    pub qr_code_spec: Option<Map<String, Value>>,

    #[serde(flatten)]
    #[garde(skip)]
    pub extra: Map<String, Value>,
}

impl DialcodeSpec {
    /// Render overrides, present only when the caller asked for images.
    pub fn image_overrides(&self) -> Option<&Map<String, Value>> {
        self.qr_code_spec.as_ref().filter(|spec| !spec.is_empty())
    }
}

/// Validated generate request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub count: u64,
    pub publisher: Option<String>,
    pub qr_code_spec: Option<Map<String, Value>>,
    /// Request as forwarded to the registry.
    pub forward: Value,
}

impl GenerateBody {
    pub fn into_generation_request(self) -> Option<GenerationRequest> {
        let request = self.request?;
        let spec = request.dialcodes.clone()?;
        let forward = serde_json::to_value(&request).ok()?;
        Some(GenerationRequest {
            count: spec.count?,
            publisher: spec.publisher.clone(),
            qr_code_spec: spec.image_overrides().cloned(),
            forward,
        })
    }
}

/// Body of a reserve or release call; only `request.dialcodes` is inspected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReserveBody {
    #[serde(default)]
    pub request: Option<ReserveRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReserveRequest {
    #[serde(default)]
    pub dialcodes: Option<DialcodeSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReserveBody {
    pub fn dialcodes(&self) -> Option<&DialcodeSpec> {
        self.request.as_ref().and_then(|r| r.dialcodes.as_ref())
    }
}

/// `request.search` of a list call. `publisher` is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListBody {
    #[garde(required, dive)]
    pub request: Option<ListRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ListRequest {
    #[garde(required, dive)]
    pub search: Option<SearchSpec>,
    #[serde(flatten)]
    #[garde(skip)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SearchSpec {
    #[garde(required, length(min = 1))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,

    #[garde(skip)]
    #[serde(rename = "qrCodeSpec", default, skip_serializing_if = "Option::is_none")]
    pub qr_code_spec: Option<Map<String, Value>>,

    #[serde(flatten)]
    #[garde(skip)]
    pub extra: Map<String, Value>,
}

/// `request.content` of a content-link call.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkBody {
    pub request: Option<LinkRequest>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkRequest {
    pub content: Option<LinkSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkSpec {
    #[serde(default, deserialize_with = "one_or_many")]
    pub identifier: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub dialcode: Vec<String>,
}

impl LinkBody {
    /// Both sides must be non-empty, and a many-to-many link is rejected.
    pub fn is_valid(&self) -> bool {
        let Some(spec) = self.request.as_ref().and_then(|r| r.content.as_ref()) else {
            return false;
        };
        let (dialcodes, identifiers) = (spec.dialcode.len(), spec.identifier.len());
        dialcodes >= 1 && identifiers >= 1 && !(dialcodes > 1 && identifiers > 1)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublisherBody {
    #[garde(required, dive)]
    pub request: Option<PublisherRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublisherRequest {
    #[garde(required, dive)]
    pub publisher: Option<PublisherSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublisherSpec {
    #[garde(required, length(min = 1))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[garde(required, length(min = 1))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    #[garde(skip)]
    pub extra: Map<String, Value>,
}

/// Non-null object lookup along a path, e.g. `["request", "dialcode", "identifier"]`.
pub fn lookup<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(body, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}
