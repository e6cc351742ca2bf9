use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, CredentialsRequest, PublicUser, RefreshRequest},
        jwt::{AuthUser, JwtKeys},
        password::{hash_pin, is_valid_pin, is_valid_username, verify_pin},
        repo::User,
    },
    error::RepositoryError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn issue_tokens(keys: &JwtKeys, user: User) -> Result<AuthResponse, (StatusCode, String)> {
    let access_token = keys.sign_access(user.id).map_err(|e| {
        error!(error = %e, "jwt sign access failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    let refresh_token = keys.sign_refresh(user.id).map_err(|e| {
        error!(error = %e, "jwt sign refresh failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: user.into(),
        previous_login: None,
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, String)> {
    let username = payload.username.trim().to_lowercase();

    if !is_valid_username(&username) {
        warn!(%username, "invalid username");
        return Err((StatusCode::BAD_REQUEST, "Invalid username".into()));
    }
    if !is_valid_pin(&payload.pin) {
        warn!("invalid pin");
        return Err((StatusCode::BAD_REQUEST, "PIN must be exactly 6 digits".into()));
    }

    let hash = hash_pin(&payload.pin).map_err(|e| {
        error!(error = %e, "hash_pin failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    let user = match state.users.create(&username, &hash).await {
        Ok(u) => u,
        Err(RepositoryError::Conflict) => {
            warn!(%username, "username already registered");
            return Err((StatusCode::CONFLICT, "Username taken".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    info!(user_id = %user.id, username = %user.username, "user registered");
    let keys = JwtKeys::from_ref(&state);
    Ok((StatusCode::CREATED, Json(issue_tokens(&keys, user)?)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let username = payload.username.trim().to_lowercase();
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid username or PIN".to_string());

    if !is_valid_username(&username) || !is_valid_pin(&payload.pin) {
        return Err(invalid());
    }

    let user = match state.users.find_by_username(&username).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(%username, "login unknown username");
            return Err(invalid());
        }
        Err(e) => {
            error!(error = %e, "find_by_username failed");
            return Err(e.into());
        }
    };

    let ok = verify_pin(&payload.pin, &user.pin_hash).map_err(|e| {
        error!(error = %e, "verify_pin failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    if !ok {
        warn!(user_id = %user.id, "login invalid pin");
        return Err(invalid());
    }

    let previous_login = user.last_login;
    let now = state.clock.now();
    state.users.record_login(user.id, now).await.map_err(|e| {
        error!(error = %e, user_id = %user.id, "record_login failed");
        e
    })?;
    let user = User {
        last_login: Some(now),
        ..user
    };

    info!(user_id = %user.id, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    let mut response = issue_tokens(&keys, user)?;
    response.previous_login = previous_login;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or((StatusCode::UNAUTHORIZED, "User not found".to_string()))?;
    Ok(Json(issue_tokens(&keys, user)?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = state.users.find_by_id(user_id).await?.ok_or_else(|| {
        error!(%user_id, "user not found");
        (StatusCode::UNAUTHORIZED, "User not found".to_string())
    })?;
    Ok(Json(user.into()))
}
