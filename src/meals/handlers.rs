use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use time::{macros::format_description, Date};
use tracing::{instrument, warn};

use super::dto::{AnalyzeBase64Request, DayQuery, MealView, RecentQuery, MAX_RECENT_LIMIT};
use super::services::{self, DayOverview};
use crate::{auth::jwt::AuthUser, nutrition::MacroTargets, state::AppState};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/day", get(get_day))
        .route("/meals/recent", get(list_recent))
        .route("/targets", get(get_targets).put(put_targets))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/analyze", post(analyze_multipart)) // multipart field "image"
        .route("/meals/analyze/base64", post(analyze_base64))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

/// POST /meals/analyze (multipart, one `image` file)
#[instrument(skip(state, mp))]
pub async fn analyze_multipart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<MealView>), (StatusCode, String)> {
    let mut upload: Option<(Bytes, String)> = None;
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("image") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            upload = Some((data, content_type));
            break;
        }
    }
    let Some((image, content_type)) = upload else {
        return Err((StatusCode::BAD_REQUEST, "image is required".into()));
    };

    let meal = services::analyze_meal(&state, user_id, image, &content_type)
        .await
        .map_err(|e| {
            warn!(error = %e, %user_id, "analyze failed");
            e
        })?;
    Ok(created(meal))
}

/// POST /meals/analyze/base64 { image_b64, content_type? }
#[instrument(skip(state, body))]
pub async fn analyze_base64(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<AnalyzeBase64Request>,
) -> Result<(StatusCode, HeaderMap, Json<MealView>), (StatusCode, String)> {
    let content_type = body.content_type.as_deref().unwrap_or("image/jpeg");
    // Accept data URLs as produced by browsers, e.g. "data:image/png;base64,...."
    let raw = body
        .image_b64
        .split_once(',')
        .map(|(_, data)| data)
        .unwrap_or(&body.image_b64);
    let bytes = Base64::decode_vec(raw.trim())
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;

    let meal = services::analyze_meal(&state, user_id, Bytes::from(bytes), content_type)
        .await
        .map_err(|e| {
            warn!(error = %e, %user_id, "analyze failed");
            e
        })?;
    Ok(created(meal))
}

fn created(meal: MealView) -> (StatusCode, HeaderMap, Json<MealView>) {
    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/meals/{}", meal.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    (StatusCode::CREATED, headers, Json(meal))
}

/// GET /meals/day?date=YYYY-MM-DD
#[instrument(skip(state))]
pub async fn get_day(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<DayQuery>,
) -> Result<Json<DayOverview>, (StatusCode, String)> {
    let date = match q.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => state.clock.today(),
    };
    let overview = services::day_overview(&state, user_id, date).await?;
    Ok(Json(overview))
}

/// GET /meals/recent?limit=N
#[instrument(skip(state))]
pub async fn list_recent(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<RecentQuery>,
) -> Result<Json<Vec<MealView>>, (StatusCode, String)> {
    let limit = q.limit.clamp(1, MAX_RECENT_LIMIT);
    let meals = services::recent_meals(&state, user_id, limit).await?;
    Ok(Json(meals))
}

#[instrument(skip(state))]
pub async fn get_targets(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MacroTargets>, (StatusCode, String)> {
    Ok(Json(services::targets(&state, user_id).await?))
}

#[instrument(skip(state))]
pub async fn put_targets(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<MacroTargets>,
) -> Result<Json<MacroTargets>, (StatusCode, String)> {
    Ok(Json(services::set_targets(&state, user_id, body).await?))
}

fn parse_date(raw: &str) -> Result<Date, (StatusCode, String)> {
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map_err(|_| (StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD".to_string()))
}
