use base64::{engine::general_purpose, Engine};

use crate::error::AnalysisError;

/// A food photo ready to be forwarded, still base64-encoded.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: &'static str,
    pub size_bytes: usize,
}

impl ImagePayload {
    /// Validates an inbound `base64Image` value. Accepts bare base64 or a
    /// `data:<mime>;base64,` URL.
    pub fn from_base64(raw: &str) -> Result<Self, AnalysisError> {
        let trimmed = raw.trim();
        let data = match trimmed.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(";base64,")
                .map(|(_, data)| data)
                .ok_or_else(|| {
                    AnalysisError::InvalidRequest("base64Image data URL is not base64".to_string())
                })?,
            None => trimmed,
        };

        // MIME encoders wrap lines at 76 chars
        let data: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();

        if data.is_empty() {
            return Err(AnalysisError::InvalidRequest("base64Image missing".to_string()));
        }

        let bytes = general_purpose::STANDARD
            .decode(&data)
            .map_err(|e| AnalysisError::InvalidRequest(format!("base64Image is not valid base64: {}", e)))?;

        if bytes.is_empty() {
            return Err(AnalysisError::InvalidRequest("base64Image missing".to_string()));
        }

        Ok(Self {
            data,
            mime_type: sniff_mime_type(&bytes),
            size_bytes: bytes.len(),
        })
    }
}

/// Picks the declared MIME type from the file signature, JPEG by default.
fn sniff_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg" // default
    }
}

/// Trait for vision models that turn a food photo into the nutrition JSON text.
#[async_trait::async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the raw JSON text produced by the model.
    async fn analyze_food_image(&self, image: &ImagePayload) -> Result<String, AnalysisError>;
}
