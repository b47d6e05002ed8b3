use serde_json::{json, Value};

/// Items below this confidence should be omitted by the model.
pub const MIN_CONFIDENCE: f64 = 0.60;

pub fn food_analysis_prompt() -> String {
    format!(
        "You are an AI food recognition and nutrition estimation engine used by a mobile nutrition app.\n\
         \n\
         Analyze the photo and follow these rules:\n\
         \n\
         1. IDENTIFICATION:\n\
         - Identify only food and drink items that are clearly visible in the image\n\
         - Do not guess ingredients that cannot be seen\n\
         - Give each item a confidence score between 0.0 and 1.0\n\
         - Omit any item with confidence below {min:.2}\n\
         \n\
         2. PORTION ESTIMATION:\n\
         - Estimate the visible portion using visual cues: plate size, utensils, hands, packaging\n\
         - Compare against well known reference portions (a cup, a slice, a palm-sized piece)\n\
         - Describe the serving with an embedded weight or volume, e.g. \"1 cup (240 ml)\" or \"2 slices (60 g)\"\n\
         \n\
         3. NUTRITION:\n\
         - Estimate calories, protein_g, carbs_g and fat_g for the estimated serving\n\
         - Use general nutrition knowledge for the identified food\n\
         - Keep calories consistent with macros (protein 4 kcal/g, carbs 4 kcal/g, fat 9 kcal/g)\n\
         \n\
         4. OUTPUT:\n\
         - Order items by visual prominence: largest or most central first\n\
         - If no food is visible, return an empty items array\n\
         - Return ONLY valid JSON, no prose, no markdown, no code fences\n\
         \n\
         Format:\n\
         {{\n\
           \"items\": [\n\
             {{\n\
               \"label\": \"Food name\",\n\
               \"confidence\": 0.0,\n\
               \"calories\": 0,\n\
               \"protein_g\": 0,\n\
               \"carbs_g\": 0,\n\
               \"fat_g\": 0,\n\
               \"serving_size\": \"amount (weight or volume)\"\n\
             }}\n\
           ]\n\
         }}",
        min = MIN_CONFIDENCE
    )
}

/// Output schema handed to the API as `generationConfig.responseSchema`.
pub fn food_analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "items": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "label": { "type": "STRING" },
                        "confidence": { "type": "NUMBER" },
                        "calories": { "type": "NUMBER" },
                        "protein_g": { "type": "NUMBER" },
                        "carbs_g": { "type": "NUMBER" },
                        "fat_g": { "type": "NUMBER" },
                        "serving_size": { "type": "STRING" }
                    },
                    "required": [
                        "label",
                        "confidence",
                        "calories",
                        "protein_g",
                        "carbs_g",
                        "fat_g",
                        "serving_size"
                    ]
                }
            }
        },
        "required": ["items"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_rules() {
        let prompt = food_analysis_prompt();

        assert!(prompt.contains("below 0.60"));
        assert!(prompt.contains("Return ONLY valid JSON"));
        assert!(prompt.contains("visual prominence"));
        assert!(prompt.contains("\"serving_size\""));
    }

    #[test]
    fn test_schema_requires_all_item_fields() {
        let schema = food_analysis_schema();
        let item = &schema["properties"]["items"]["items"];

        let required: Vec<&str> = item["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert_eq!(required.len(), 7);
        for field in required {
            assert!(item["properties"].get(field).is_some(), "missing property {}", field);
        }
        assert_eq!(schema["required"][0], "items");
    }
}
