use axum::http::StatusCode;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::MealView;
use super::repo::{MealRecord, NewMeal};
use crate::error::RepositoryError;
use crate::nutrition::{ExtractionError, MacroSummary, MacroTargets};
use crate::state::AppState;
use crate::storage::{meal_image_key, IMAGE_URL_TTL_SECS};

#[derive(Debug, Error)]
pub enum MealError {
    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<MealError> for (StatusCode, String) {
    fn from(e: MealError) -> Self {
        match e {
            MealError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            MealError::Extraction(e) => e.into(),
            MealError::Repository(e) => e.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DayOverview {
    pub date: Date,
    pub meals: Vec<MealView>,
    pub consumed: MacroSummary,
    pub targets: MacroTargets,
    pub remaining: MacroSummary,
}

/// Estimates macros for a photo and records the meal.
///
/// Nothing is stored when extraction fails. If the photo itself cannot be
/// uploaded the meal is still saved, just without an image reference.
#[instrument(skip(st, image), fields(bytes = image.len()))]
pub async fn analyze_meal(
    st: &AppState,
    user_id: Uuid,
    image: Bytes,
    content_type: &str,
) -> Result<MealView, MealError> {
    if image.is_empty() {
        return Err(MealError::Invalid("image is empty"));
    }
    if !content_type.starts_with("image/") {
        return Err(MealError::Invalid("content type must be an image"));
    }

    let nutrition = st.extractor.extract(image.clone(), content_type).await?;
    info!(%user_id, calories = nutrition.calories, "meal analyzed");

    let key = meal_image_key(user_id, Uuid::new_v4(), content_type);
    let image_url = match st.storage.put_object(&key, image, content_type).await {
        Ok(()) => Some(key),
        Err(e) => {
            warn!(error = %e, %user_id, "image upload failed; saving meal without image");
            None
        }
    };

    let record = st
        .meals
        .save(NewMeal {
            user_id,
            nutrition,
            image_url,
        })
        .await?;
    Ok(present(st, record).await)
}

#[instrument(skip(st))]
pub async fn day_overview(
    st: &AppState,
    user_id: Uuid,
    date: Date,
) -> Result<DayOverview, MealError> {
    let records = st
        .meals
        .list_for_day(user_id, date, st.clock.offset())
        .await?;
    let targets = st.meals.get_targets(user_id).await?.unwrap_or_default();

    let consumed = MacroSummary::total(records.iter().map(|m| &m.nutrition));
    let remaining = targets.remaining(&consumed);
    let meals = present_many(st, records).await;

    Ok(DayOverview {
        date,
        meals,
        consumed,
        targets,
        remaining,
    })
}

#[instrument(skip(st))]
pub async fn recent_meals(
    st: &AppState,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<MealView>, MealError> {
    let records = st.meals.list_recent(user_id, limit).await?;
    Ok(present_many(st, records).await)
}

pub async fn targets(st: &AppState, user_id: Uuid) -> Result<MacroTargets, MealError> {
    Ok(st.meals.get_targets(user_id).await?.unwrap_or_default())
}

pub async fn set_targets(
    st: &AppState,
    user_id: Uuid,
    targets: MacroTargets,
) -> Result<MacroTargets, MealError> {
    targets.validate().map_err(MealError::Invalid)?;
    Ok(st.meals.put_targets(user_id, targets).await?)
}

async fn present_many(st: &AppState, records: Vec<MealRecord>) -> Vec<MealView> {
    let mut out = Vec::with_capacity(records.len());
    for r in records {
        out.push(present(st, r).await);
    }
    out
}

/// Swaps the stored object key for a short-lived link.
async fn present(st: &AppState, record: MealRecord) -> MealView {
    let image_url = match &record.image_url {
        Some(key) => match st.storage.presign_get(key, IMAGE_URL_TTL_SECS).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, meal_id = %record.id, "presign failed");
                None
            }
        },
        None => None,
    };
    MealView {
        id: record.id,
        created_at: record.created_at,
        nutrition: record.nutrition,
        image_url,
    }
}
