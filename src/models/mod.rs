use serde::{Deserialize, Serialize};

/// Inbound body of `POST /api/analyze-food`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeFoodRequest {
    #[serde(rename = "base64Image", default)]
    pub base64_image: Option<String>,
}

/// One food item as estimated by the vision model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub label: String,
    pub confidence: f64, // 0.60 - 1.0 requested, not enforced
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub serving_size: String, // e.g. "1 cup (240 ml)"
}

/// Items ordered by visual prominence, as returned upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub items: Vec<FoodItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub model: String,
    pub timestamp: String, // ISO-8601, UTC
    pub items_detected: usize,
}

/// Success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub data: AnalysisResult,
    pub metadata: AnalysisMetadata,
}

/// Failure body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Declared calories that disagree with the 4/4/9 macro conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyWarning {
    pub label: String,
    pub declared_calories: f64,
    pub derived_calories: f64,
}

impl std::fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: declared {:.1} kcal, macros give {:.1} kcal",
            self.label, self.declared_calories, self.derived_calories
        )
    }
}
