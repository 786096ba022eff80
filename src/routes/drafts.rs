//! Draft endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::posts::{Created, Done};
use crate::AppState;
use crate::domain::posts::models::{DraftSummary, PostPayload, PostView, ThreadContent};
use crate::services::posts;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts/drafts", get(fetch_drafts).post(create_draft))
        .route("/posts/drafts/{post_id}", get(fetch_draft).put(edit_draft))
        .route("/posts/schedule-draft/{post_id}", put(convert_draft))
}

#[derive(Serialize)]
struct DraftsResponse {
    status: &'static str,
    drafts: Vec<DraftSummary>,
}

#[derive(Serialize)]
struct DraftResponse {
    status: &'static str,
    post: PostView,
}

/// POST /posts/drafts
async fn create_draft(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(content): Json<ThreadContent>,
) -> Result<Json<Created>, ApiError> {
    let id = posts::create_draft(&state.core, actor, &content).await?;
    Ok(Json(Created { status: "success", id }))
}

/// GET /posts/drafts
async fn fetch_drafts(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<DraftsResponse>, ApiError> {
    let drafts = posts::fetch_drafts(&state.core, actor).await?;
    Ok(Json(DraftsResponse {
        status: "success",
        drafts,
    }))
}

/// GET /posts/drafts/{post_id}
async fn fetch_draft(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<DraftResponse>, ApiError> {
    let post = posts::fetch_draft(&state.core, actor, post_id).await?;
    Ok(Json(DraftResponse {
        status: "success",
        post,
    }))
}

/// PUT /posts/drafts/{post_id}
async fn edit_draft(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
    Json(content): Json<ThreadContent>,
) -> Result<Json<Done>, ApiError> {
    posts::edit_draft(&state.core, actor, post_id, &content).await?;
    Ok(Done::ok())
}

/// PUT /posts/schedule-draft/{post_id} - schedule the draft with its final content
async fn convert_draft(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<PostPayload>,
) -> Result<Json<Done>, ApiError> {
    posts::convert_draft(&state.core, actor, post_id, &payload).await?;
    Ok(Done::ok())
}
