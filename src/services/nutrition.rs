use serde_json::Value;

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, ConsistencyWarning, FoodItem};

pub const PROTEIN_KCAL_PER_G: f64 = 4.0;
pub const CARBS_KCAL_PER_G: f64 = 4.0;
pub const FAT_KCAL_PER_G: f64 = 9.0;

/// Allowed relative gap between declared and macro-derived calories.
pub const CALORIE_TOLERANCE: f64 = 0.15;

/// Parses the model's text payload into validated food items.
///
/// Text that is not JSON is a malformed upstream response; JSON without an
/// `items` array, or with items missing required fields, is invalid nutrition data.
pub fn parse_nutrition_payload(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let value: Value = serde_json::from_str(text.trim()).map_err(|e| {
        log::error!("❌ Model output is not valid JSON: {}", e);
        log::debug!("📄 Raw model output: {}", truncate(text, 500));
        AnalysisError::MalformedUpstreamResponse(format!("model output is not valid JSON: {}", e))
    })?;

    let raw_items = value
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AnalysisError::InvalidNutritionData("response does not contain an items array".to_string())
        })?;

    let items = raw_items
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_value::<FoodItem>(raw.clone()).map_err(|e| {
                AnalysisError::InvalidNutritionData(format!("item {}: {}", index, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AnalysisResult { items })
}

pub fn derived_calories(item: &FoodItem) -> f64 {
    item.protein_g * PROTEIN_KCAL_PER_G
        + item.carbs_g * CARBS_KCAL_PER_G
        + item.fat_g * FAT_KCAL_PER_G
}

/// Flags an item whose declared calories differ from its macros by more than 15%.
pub fn check_consistency(item: &FoodItem) -> Option<ConsistencyWarning> {
    let derived = derived_calories(item);
    if (item.calories - derived).abs() > CALORIE_TOLERANCE * item.calories {
        Some(ConsistencyWarning {
            label: item.label.clone(),
            declared_calories: item.calories,
            derived_calories: derived,
        })
    } else {
        None
    }
}

/// Checks every item. Items are never modified.
pub fn consistency_warnings(result: &AnalysisResult) -> Vec<ConsistencyWarning> {
    result.items.iter().filter_map(check_consistency).collect()
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
