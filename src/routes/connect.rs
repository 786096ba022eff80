//! Publishing account connection: store or remove the account's credentials

use axum::{Json, Router, extract::State, routing::put};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::posts::Done;
use crate::AppState;
use crate::domain::accounts::{self, Credentials};
use crate::services::error::ServiceError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/connect/twitter", put(connect).delete(disconnect))
}

#[derive(Deserialize)]
struct ConnectRequest {
    token: String,
    secret: String,
}

/// PUT /connect/twitter
async fn connect(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<Done>, ApiError> {
    if request.token.is_empty() || request.secret.is_empty() {
        return Err(ServiceError::Validation("Token and secret are required".into()).into());
    }

    let credentials = Credentials {
        token: request.token,
        secret: request.secret,
    };
    accounts::store_credentials(&state.db, actor.account_id, &credentials, &state.cipher).await?;

    tracing::info!(account_id = actor.account_id, "Connected publishing account");
    Ok(Done::ok())
}

/// DELETE /connect/twitter
async fn disconnect(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Done>, ApiError> {
    let removed = accounts::delete_credentials(&state.db, actor.account_id).await?;
    if removed == 0 {
        return Err(ServiceError::NotConnected.into());
    }

    tracing::info!(account_id = actor.account_id, "Disconnected publishing account");
    Ok(Done::ok())
}
