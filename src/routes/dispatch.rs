//! Externally triggered dispatch, for deployments that drive publishing
//! from an outside scheduler instead of the in-process worker

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CronAuth;
use super::error::ApiError;
use crate::AppState;
use crate::services::dispatch;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/dispatch/twitter", post(dispatch_post))
}

#[derive(Deserialize)]
struct DispatchRequest {
    post_id: i64,
    account_id: i64,
}

#[derive(Serialize)]
struct DispatchResponse {
    status: &'static str,
    ids: Vec<String>,
}

/// POST /dispatch/twitter
async fn dispatch_post(
    State(state): State<Arc<AppState>>,
    _auth: CronAuth,
    Json(request): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let ids = dispatch::dispatch(&state.core, request.account_id, request.post_id).await?;
    Ok(Json(DispatchResponse {
        status: "success",
        ids,
    }))
}
