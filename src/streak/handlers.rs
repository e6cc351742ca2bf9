use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use super::services::{self, CheckInOutcome, StreakView};
use crate::{auth::jwt::AuthUser, state::AppState};

pub fn streak_routes() -> Router<AppState> {
    Router::new()
        .route("/streak", get(get_streak))
        .route("/streak/checkin", post(check_in))
}

/// POST /streak/checkin, called by the client each time the app is opened.
#[instrument(skip(state))]
pub async fn check_in(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<CheckInOutcome>, (StatusCode, String)> {
    let today = state.clock.today();
    let outcome = services::check_in(state.streaks.as_ref(), user_id, today)
        .await
        .map_err(|e| {
            error!(error = %e, %user_id, "streak check-in failed");
            e
        })?;
    Ok(Json(outcome))
}

#[instrument(skip(state))]
pub async fn get_streak(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<StreakView>, (StatusCode, String)> {
    let today = state.clock.today();
    Ok(Json(
        services::current(state.streaks.as_ref(), user_id, today).await?,
    ))
}
