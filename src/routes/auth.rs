//! Request authentication extractors

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, request::Parts},
};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use super::error::LogErr;
use crate::AppState;
use crate::domain::accounts;
use crate::services::cookies::ACCESS_TOKEN_NAME;
use crate::services::{Actor, session};

/// Extractor that validates the session token and returns who is acting.
///
/// The token is read from the `access_token` cookie, or from an
/// `Authorization: Bearer` header for non-browser clients.
pub struct AuthUser(pub Actor);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .log_500("Cookie extraction error")?;

        let token = jar
            .get(ACCESS_TOKEN_NAME)
            .map(|c| c.value().to_string())
            .or_else(|| bearer_token(&parts.headers).map(str::to_string))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let actor = session::validate_access_token(&token, &state.jwt_secret)
            .log_status("JWT validation failed", StatusCode::UNAUTHORIZED)?;

        // a valid token for a user removed from the account is still unauthorized
        let member = accounts::is_member(&state.db, actor.user_id, actor.account_id)
            .await
            .log_500("Membership check error")?;
        if !member {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(AuthUser(actor))
    }
}

/// Extractor for calls from the external scheduler, authenticated with a
/// bearer token signed by the cron secret
pub struct CronAuth;

impl FromRequestParts<Arc<AppState>> for CronAuth {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        session::validate_cron_token(token, &state.jwt_cron_secret)
            .log_status("Cron token validation failed", StatusCode::UNAUTHORIZED)?;
        Ok(CronAuth)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
