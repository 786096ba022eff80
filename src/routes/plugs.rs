//! Plug endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::posts::Done;
use crate::AppState;
use crate::domain::plugs::{self, Plug};
use crate::services::error::ServiceError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/plugs", get(list_plugs).post(create_plug))
        .route(
            "/plugs/{plug_id}",
            get(get_plug).put(update_plug).delete(delete_plug),
        )
}

#[derive(Deserialize)]
struct PlugRequest {
    name: String,
    plug: String,
}

#[derive(Serialize)]
struct PlugResponse {
    status: &'static str,
    plug: Plug,
}

#[derive(Serialize)]
struct PlugsResponse {
    status: &'static str,
    plugs: Vec<Plug>,
}

async fn create_plug(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(request): Json<PlugRequest>,
) -> Result<Json<PlugResponse>, ApiError> {
    plugs::validate(&request.name, &request.plug)?;
    let plug = plugs::create_plug(&state.db, actor.account_id, request.name.trim(), &request.plug).await?;
    Ok(Json(PlugResponse {
        status: "success",
        plug,
    }))
}

async fn list_plugs(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<PlugsResponse>, ApiError> {
    let plugs = plugs::list_plugs(&state.db, actor.account_id).await?;
    Ok(Json(PlugsResponse {
        status: "success",
        plugs,
    }))
}

async fn get_plug(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(plug_id): Path<i64>,
) -> Result<Json<PlugResponse>, ApiError> {
    let plug = plugs::get_plug(&state.db, actor.account_id, plug_id)
        .await?
        .ok_or(ServiceError::NotFound("Plug"))?;
    Ok(Json(PlugResponse {
        status: "success",
        plug,
    }))
}

async fn update_plug(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(plug_id): Path<i64>,
    Json(request): Json<PlugRequest>,
) -> Result<Json<PlugResponse>, ApiError> {
    plugs::validate(&request.name, &request.plug)?;
    let plug = plugs::update_plug(
        &state.db,
        actor.account_id,
        plug_id,
        request.name.trim(),
        &request.plug,
    )
    .await?
    .ok_or(ServiceError::NotFound("Plug"))?;
    Ok(Json(PlugResponse {
        status: "success",
        plug,
    }))
}

/// Posts referencing the plug keep publishing without it
async fn delete_plug(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(plug_id): Path<i64>,
) -> Result<Json<Done>, ApiError> {
    plugs::delete_plug(&state.db, actor.account_id, plug_id).await?;
    Ok(Done::ok())
}
