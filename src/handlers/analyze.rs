use chrono::{SecondsFormat, Utc};
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::models::{AnalysisMetadata, AnalysisResponse, ConsistencyWarning};
use crate::services::nutrition::{consistency_warnings, parse_nutrition_payload};
use crate::services::{ImagePayload, VisionModel};

/// Outcome of one successful analysis. Warnings are diagnostics only and are
/// not part of the response body.
#[derive(Debug)]
pub struct Analysis {
    pub response: AnalysisResponse,
    pub warnings: Vec<ConsistencyWarning>,
}

pub struct FoodAnalyzer {
    model: Arc<dyn VisionModel>,
}

impl FoodAnalyzer {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self { model }
    }

    /// Runs one photo through the model and validates what comes back.
    ///
    /// Input is checked before any network call. Exactly one upstream call is
    /// made per invocation; the declared values are returned as-is even when the
    /// calorie check disagrees with them.
    pub async fn analyze(&self, base64_image: Option<&str>) -> Result<Analysis, AnalysisError> {
        let raw = base64_image
            .filter(|image| !image.trim().is_empty())
            .ok_or_else(|| AnalysisError::InvalidRequest("base64Image missing".to_string()))?;

        let image = ImagePayload::from_base64(raw)?;
        log::info!("📸 Analyzing food image ({} bytes, {})", image.size_bytes, image.mime_type);

        let text = self.model.analyze_food_image(&image).await?;
        let data = parse_nutrition_payload(&text)?;

        let warnings = consistency_warnings(&data);
        for warning in &warnings {
            log::warn!("⚠️ Calorie/macro mismatch: {}", warning);
        }

        let items_detected = data.items.len();
        log::info!("✅ Detected {} food item(s)", items_detected);

        Ok(Analysis {
            response: AnalysisResponse {
                success: true,
                data,
                metadata: AnalysisMetadata {
                    model: self.model.model_name().to_string(),
                    timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                    items_detected,
                },
            },
            warnings,
        })
    }
}
