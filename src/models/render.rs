use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::Display;

/// Encoded image format requested from the renderer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImageFormat {
    Png,
    #[serde(alias = "jpeg")]
    Jpg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpg => "image/jpeg",
        }
    }

    /// Whether sniffed image bytes are of this format.
    pub fn matches(&self, sniffed: image::ImageFormat) -> bool {
        matches!(
            (self, sniffed),
            (ImageFormat::Png, image::ImageFormat::Png) | (ImageFormat::Jpg, image::ImageFormat::Jpeg)
        )
    }
}

/// QR image rendering configuration after caller overrides are merged onto defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    pub error_correction_level: String,
    pub pixels_per_block: u32,
    pub qr_code_margin: u32,
    pub text_font_name: String,
    pub text_font_size: u32,
    pub text_character_spacing: f64,
    pub image_format: ImageFormat,
    pub colour_model: String,
    pub image_border_size: u32,

    /// Caller-supplied keys this service does not interpret; handed to the renderer as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            error_correction_level: "H".to_string(),
            pixels_per_block: 2,
            qr_code_margin: 3,
            text_font_name: "Verdana".to_string(),
            text_font_size: 11,
            text_character_spacing: 0.1,
            image_format: ImageFormat::Png,
            colour_model: "Grayscale".to_string(),
            image_border_size: 1,
            extra: Map::new(),
        }
    }
}

impl RenderConfig {
    /// Overlay caller fields onto the defaults. Absent fields keep their default.
    pub fn merged(overrides: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut base = match serde_json::to_value(Self::default())? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in overrides {
            if value.is_null() {
                continue;
            }
            base.insert(key.clone(), value.clone());
        }
        serde_json::from_value(Value::Object(base))
    }
}
