use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::nutrition::NutritionInfo;

/// Meal as returned to clients; `image_url` is a presigned link, not the object key.
#[derive(Debug, Clone, Serialize)]
pub struct MealView {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(flatten)]
    pub nutrition: NutritionInfo,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeBase64Request {
    pub image_b64: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// `YYYY-MM-DD`; today when absent.
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

pub const MAX_RECENT_LIMIT: i64 = 100;
