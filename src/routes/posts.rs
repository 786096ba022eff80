//! Scheduled post endpoints

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::AppState;
use crate::domain::posts::models::{PostPayload, PostView, ThreadContent};
use crate::services::queue::{self, Queue};
use crate::services::{dispatch, posts};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/now", post(post_now))
        .route("/posts/queue", get(fetch_queue))
        .route(
            "/posts/{post_id}",
            get(fetch_post).put(edit_post).delete(delete_post),
        )
}

#[derive(Serialize)]
pub struct Created {
    pub status: &'static str,
    pub id: i64,
}

#[derive(Serialize)]
pub struct Done {
    pub status: &'static str,
}

impl Done {
    pub fn ok() -> Json<Self> {
        Json(Done { status: "success" })
    }
}

#[derive(Serialize)]
struct Published {
    status: &'static str,
    ids: Vec<String>,
}

#[derive(Serialize)]
struct QueueResponse {
    status: &'static str,
    posts: Queue,
}

#[derive(Serialize)]
struct PostResponse {
    status: &'static str,
    post: PostView,
}

#[derive(Deserialize)]
struct QueueQuery {
    /// Page forward: the window starts the day after this timestamp
    timestamp: Option<i64>,
}

/// POST /posts
async fn create_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(payload): Json<PostPayload>,
) -> Result<Json<Created>, ApiError> {
    let id = posts::create_post(&state.core, actor, &payload).await?;
    Ok(Json(Created { status: "success", id }))
}

/// POST /posts/now - publish without storing
async fn post_now(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(content): Json<ThreadContent>,
) -> Result<Json<Published>, ApiError> {
    let ids = dispatch::dispatch_now(&state.core, actor, &content).await?;
    Ok(Json(Published { status: "success", ids }))
}

/// GET /posts/queue?timestamp=
async fn fetch_queue(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Query(query): Query<QueueQuery>,
) -> Result<Json<QueueResponse>, ApiError> {
    let posts = queue::fetch_queue(&state.core, actor, query.timestamp).await?;
    Ok(Json(QueueResponse {
        status: "success",
        posts,
    }))
}

/// GET /posts/{post_id}
async fn fetch_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = posts::fetch_post(&state.core, actor, post_id).await?;
    Ok(Json(PostResponse {
        status: "success",
        post,
    }))
}

/// PUT /posts/{post_id}
async fn edit_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
    Json(payload): Json<PostPayload>,
) -> Result<Json<Done>, ApiError> {
    posts::edit_post(&state.core, actor, post_id, &payload).await?;
    Ok(Done::ok())
}

/// DELETE /posts/{post_id}
async fn delete_post(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<Json<Done>, ApiError> {
    posts::delete_post(&state.core, actor, post_id).await?;
    Ok(Done::ok())
}
