//! Sign-up, login and logout endpoints

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;
use std::sync::Arc;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};

use super::error::{ApiError, LogErr};
use crate::AppState;
use crate::services::error::ServiceError;
use crate::services::session::{self, SignupRequest};

pub fn routes() -> Router<Arc<AppState>> {
    // 10 request burst, then one every 6 seconds per client IP
    let rate_limit_layer = GovernorConfigBuilder::default()
        .per_second(6)
        .burst_size(10)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .map(|config| GovernorLayer {
            config: config.into(),
        });

    let router = Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout));

    match rate_limit_layer {
        Some(layer) => router.layer(layer),
        None => {
            tracing::warn!("Invalid rate limit configuration, auth routes are not rate limited");
            router
        }
    }
}

#[derive(Serialize)]
struct SignupResponse {
    status: &'static str,
    user_id: i64,
    account_id: i64,
}

#[derive(Serialize)]
struct LoginResponse {
    status: &'static str,
    token: String,
}

/// POST /signup
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, ApiError> {
    let actor = session::signup(&state.db, &request).await?;
    Ok(Json(SignupResponse {
        status: "success",
        user_id: actor.user_id,
        account_id: actor.account_id,
    }))
}

/// POST /login - issues the session token as a cookie and in the body
async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, ApiError> {
    let actor = session::login(&state.db, &request).await?;

    let token = session::create_access_token(actor, &state.jwt_secret)
        .map_err(|e| ServiceError::Internal(format!("Failed to create access token: {}", e)))?;
    let cookie = state
        .cookies
        .access_cookie(&token)
        .map_err(|e| ServiceError::Internal(format!("Failed to build access cookie: {}", e)))?;

    tracing::info!(user_id = actor.user_id, account_id = actor.account_id, "Logged in");

    let mut response = Json(LoginResponse {
        status: "success",
        token,
    })
    .into_response();
    response.headers_mut().append(SET_COOKIE, cookie);
    Ok(response)
}

/// POST /logout - clear the session cookie
async fn logout(State(state): State<Arc<AppState>>) -> Result<Response, StatusCode> {
    let cookie = state
        .cookies
        .clear_access_cookie()
        .log_500("Failed to build clearing cookie")?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().append(SET_COOKIE, cookie);
    Ok(response)
}
