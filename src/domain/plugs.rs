//! Plugs: reusable closing tweets owned by an account

use serde::Serialize;
use sqlx::{Executor, Postgres};

use crate::constants::{PLUG_NAME_MAX_CHARS, TWEET_MAX_CHARS};
use crate::services::error::ServiceError;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plug {
    pub id: i64,
    pub name: String,
    pub plug: String,
}

/// A plug is published as a tweet, so its body obeys the tweet limit
pub fn validate(name: &str, plug: &str) -> Result<(), ServiceError> {
    let name_len = name.trim().chars().count();
    if name_len == 0 {
        return Err(ServiceError::Validation("Plug name cannot be empty".into()));
    }
    if name_len > PLUG_NAME_MAX_CHARS {
        return Err(ServiceError::Validation(
            "Plug name cannot be larger than 50 characters".into(),
        ));
    }
    match plug.chars().count() {
        0 => Err(ServiceError::Validation("Plug cannot be empty".into())),
        n if n > TWEET_MAX_CHARS => Err(ServiceError::Validation(
            "Plug cannot exceed more than 280 characters".into(),
        )),
        _ => Ok(()),
    }
}

pub async fn create_plug<'e, E>(
    executor: E,
    account_id: i64,
    name: &str,
    plug: &str,
) -> Result<Plug, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        INSERT INTO plugs (name, plug, account_id)
        VALUES ($1, $2, $3)
        RETURNING id, name, plug
        "#,
    )
    .bind(name)
    .bind(plug)
    .bind(account_id)
    .fetch_one(executor)
    .await
}

/// `None` when the plug does not exist or belongs to another account
pub async fn update_plug<'e, E>(
    executor: E,
    account_id: i64,
    plug_id: i64,
    name: &str,
    plug: &str,
) -> Result<Option<Plug>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        UPDATE plugs
        SET name = $1, plug = $2
        WHERE id = $3 AND account_id = $4
        RETURNING id, name, plug
        "#,
    )
    .bind(name)
    .bind(plug)
    .bind(plug_id)
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

pub async fn delete_plug<'e, E>(executor: E, account_id: i64, plug_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM plugs WHERE id = $1 AND account_id = $2")
        .bind(plug_id)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn list_plugs<'e, E>(executor: E, account_id: i64) -> Result<Vec<Plug>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, name, plug FROM plugs WHERE account_id = $1 ORDER BY id")
        .bind(account_id)
        .fetch_all(executor)
        .await
}

pub async fn get_plug<'e, E>(
    executor: E,
    account_id: i64,
    plug_id: i64,
) -> Result<Option<Plug>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, name, plug FROM plugs WHERE id = $1 AND account_id = $2")
        .bind(plug_id)
        .bind(account_id)
        .fetch_optional(executor)
        .await
}
