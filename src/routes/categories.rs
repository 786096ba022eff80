//! Category endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::AuthUser;
use super::error::ApiError;
use super::posts::Done;
use crate::AppState;
use crate::domain::categories::{self, Category};
use crate::services::error::ServiceError;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{category_id}",
            put(update_category).delete(delete_category),
        )
}

#[derive(Deserialize)]
struct CategoryRequest {
    name: String,
}

#[derive(Serialize)]
struct CategoryResponse {
    status: &'static str,
    category: Category,
}

#[derive(Serialize)]
struct CategoriesResponse {
    status: &'static str,
    categories: Vec<Category>,
}

async fn create_category(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let name = request.name.trim();
    categories::validate_name(name)?;
    let category = categories::create_category(&state.db, actor.user_id, name).await?;
    Ok(Json(CategoryResponse {
        status: "success",
        category,
    }))
}

async fn list_categories(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
) -> Result<Json<CategoriesResponse>, ApiError> {
    let categories = categories::list_categories(&state.db, actor.user_id).await?;
    Ok(Json(CategoriesResponse {
        status: "success",
        categories,
    }))
}

async fn update_category(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(category_id): Path<i64>,
    Json(request): Json<CategoryRequest>,
) -> Result<Json<CategoryResponse>, ApiError> {
    let name = request.name.trim();
    categories::validate_name(name)?;
    let category = categories::update_category(&state.db, actor.user_id, category_id, name)
        .await?
        .ok_or(ServiceError::NotFound("Category"))?;
    Ok(Json(CategoryResponse {
        status: "success",
        category,
    }))
}

async fn delete_category(
    State(state): State<Arc<AppState>>,
    AuthUser(actor): AuthUser,
    Path(category_id): Path<i64>,
) -> Result<Json<Done>, ApiError> {
    categories::delete_category(&state.db, actor.user_id, category_id).await?;
    Ok(Done::ok())
}
