//! Categories: user-defined labels for posts

use serde::Serialize;
use sqlx::{Executor, Postgres};

use crate::constants::CATEGORY_NAME_MAX_CHARS;
use crate::services::error::ServiceError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

pub fn validate_name(name: &str) -> Result<(), ServiceError> {
    match name.chars().count() {
        0 => Err(ServiceError::Validation("Category name cannot be empty".into())),
        n if n > CATEGORY_NAME_MAX_CHARS => Err(ServiceError::Validation(
            "Category name cannot be larger than 20 characters".into(),
        )),
        _ => Ok(()),
    }
}

pub async fn create_category<'e, E>(executor: E, user_id: i64, name: &str) -> Result<Category, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("INSERT INTO categories (name, created_by) VALUES ($1, $2) RETURNING id, name")
        .bind(name)
        .bind(user_id)
        .fetch_one(executor)
        .await
}

pub async fn update_category<'e, E>(
    executor: E,
    user_id: i64,
    category_id: i64,
    name: &str,
) -> Result<Option<Category>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        "UPDATE categories SET name = $1 WHERE id = $2 AND created_by = $3 RETURNING id, name",
    )
    .bind(name)
    .bind(category_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub async fn delete_category<'e, E>(executor: E, user_id: i64, category_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM categories WHERE id = $1 AND created_by = $2")
        .bind(category_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_categories<'e, E>(executor: E, user_id: i64) -> Result<Vec<Category>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, name FROM categories WHERE created_by = $1 ORDER BY id")
        .bind(user_id)
        .fetch_all(executor)
        .await
}
