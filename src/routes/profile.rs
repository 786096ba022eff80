//! Profile and timezone endpoints

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::posts::Done;
use crate::AppState;
use crate::domain::accounts::{self, Profile, Timezone};
use crate::services::error::ServiceError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profile", get(fetch_profile).put(update_profile))
        .route("/timezones", get(list_timezones))
}

#[derive(Serialize)]
struct ProfileResponse {
    status: &'static str,
    profile: Profile,
    /// Whether the account has publishing credentials stored
    connected: bool,
}

#[derive(Deserialize)]
struct ProfileUpdate {
    name: Option<String>,
    timezone_id: Option<i32>,
}

#[derive(Serialize)]
struct TimezonesResponse {
    status: &'static str,
    timezones: Vec<Timezone>,
}

/// GET /profile
async fn fetch_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let profile = accounts::fetch_profile(&state.db, actor.user_id)
        .await?
        .ok_or(ServiceError::NotFound("Profile"))?;
    let connected = accounts::has_credentials(&state.db, actor.account_id).await?;

    Ok(Json(ProfileResponse {
        status: "success",
        profile,
        connected,
    }))
}

/// PUT /profile - absent fields are left unchanged
async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Done>, ApiError> {
    let name = update.name.as_deref().map(str::trim);
    if name == Some("") {
        return Err(ServiceError::Validation("Name cannot be empty".into()).into());
    }
    if let Some(timezone_id) = update.timezone_id {
        if !accounts::timezone_exists(&state.db, timezone_id).await? {
            return Err(ServiceError::Validation("Unknown timezone".into()).into());
        }
    }

    let updated = accounts::update_profile(&state.db, actor.user_id, name, update.timezone_id).await?;
    if !updated {
        return Err(ServiceError::NotFound("Profile").into());
    }
    Ok(Done::ok())
}

/// GET /timezones
async fn list_timezones(
    State(state): State<Arc<AppState>>,
    AuthUser(_actor): AuthUser,
) -> Result<Json<TimezonesResponse>, ApiError> {
    let timezones = accounts::list_timezones(&state.db).await?;
    Ok(Json(TimezonesResponse {
        status: "success",
        timezones,
    }))
}
