use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{model::NutritionInfo, ExtractionError};

/// Pulls `{calories, protein, carbs, fat}` out of free-form model output.
///
/// The whole text is tried as JSON first. Only when that fails to parse is
/// the outermost `{ ... }` span tried instead.
pub fn parse_nutrition_response(text: &str) -> Result<NutritionInfo, ExtractionError> {
    lazy_static! {
        static ref OBJECT_RE: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
    }

    let value = match serde_json::from_str::<Value>(text.trim()) {
        Ok(v) => v,
        Err(_) => {
            let candidate = OBJECT_RE
                .find(text)
                .ok_or(ExtractionError::InvalidFormat)?;
            serde_json::from_str::<Value>(candidate.as_str())
                .map_err(|_| ExtractionError::InvalidFormat)?
        }
    };

    validate(&value).ok_or(ExtractionError::InvalidFormat)
}

fn validate(value: &Value) -> Option<NutritionInfo> {
    let obj = value.as_object()?;
    let field = |key: &str| -> Option<f64> {
        let v = obj.get(key)?;
        if !v.is_number() {
            return None;
        }
        v.as_f64().filter(|n| n.is_finite() && *n >= 0.0)
    };
    Some(NutritionInfo {
        calories: field("calories")?,
        protein: field("protein")?,
        carbs: field("carbs")?,
        fat: field("fat")?,
    })
}
