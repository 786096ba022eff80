//! Users, accounts, profiles and dispatch credentials
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use serde::Serialize;
use sqlx::{Executor, Postgres};

/// Decrypted token/secret pair for the publishing API
#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Credentials {
    pub token: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Symmetric key and pgcrypto options used for credentials at rest
#[derive(Clone)]
pub struct CredentialCipher {
    pub key: String,
    pub options: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserLogin {
    pub id: i64,
    pub password_hash: String,
    pub account_id: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub name: Option<String>,
    pub timezone_id: Option<i32>,
    pub timezone: Option<String>,
    pub offset_mins: i32,
    pub avatar_key: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Timezone {
    pub id: i32,
    pub name: String,
    pub offset_mins: i32,
}

/// Insert a user row, returning its id. Fails with a unique violation on a taken email.
pub async fn insert_user<'e, E>(
    executor: E,
    email: &str,
    password_hash: &str,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (id,): (i64,) =
        sqlx::query_as("INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id")
            .bind(email)
            .bind(password_hash)
            .fetch_one(executor)
            .await?;
    Ok(id)
}

pub async fn insert_account<'e, E>(executor: E, name: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (id,): (i64,) = sqlx::query_as("INSERT INTO accounts (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(executor)
        .await?;
    Ok(id)
}

pub async fn insert_member<'e, E>(executor: E, account_id: i64, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO members (account_id, user_id) VALUES ($1, $2)")
        .bind(account_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn insert_profile<'e, E>(executor: E, user_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO profiles (user_id) VALUES ($1)")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Look up a user by email together with their first account
pub async fn find_login<'e, E>(executor: E, email: &str) -> Result<Option<UserLogin>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT u.id, u.password_hash, m.account_id
        FROM users u
        JOIN members m ON m.user_id = u.id
        WHERE u.email = $1
        ORDER BY m.account_id ASC
        LIMIT 1
        "#,
    )
    .bind(email)
    .fetch_optional(executor)
    .await
}

/// Whether `user_id` belongs to `account_id`
pub async fn is_member<'e, E>(executor: E, user_id: i64, account_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT user_id FROM members WHERE user_id = $1 AND account_id = $2")
            .bind(user_id)
            .bind(account_id)
            .fetch_optional(executor)
            .await?;
    Ok(row.is_some())
}

pub async fn fetch_profile<'e, E>(executor: E, user_id: i64) -> Result<Option<Profile>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.name, p.timezone_id, t.name AS timezone,
               COALESCE(t.offset_mins, 0) AS offset_mins, p.avatar_key
        FROM profiles p
        LEFT JOIN timezones t ON t.id = p.timezone_id
        WHERE p.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

/// UTC offset of the user's timezone in minutes; zero without a profile
pub async fn offset_minutes<'e, E>(executor: E, user_id: i64) -> Result<i32, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i32,)> = sqlx::query_as(
        r#"
        SELECT COALESCE(t.offset_mins, 0)
        FROM profiles p
        LEFT JOIN timezones t ON t.id = p.timezone_id
        WHERE p.user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(offset,)| offset).unwrap_or(0))
}

/// Returns false when the user has no profile row
pub async fn update_profile<'e, E>(
    executor: E,
    user_id: i64,
    name: Option<&str>,
    timezone_id: Option<i32>,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE profiles
        SET name = COALESCE($2, name),
            timezone_id = COALESCE($3, timezone_id)
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(name)
    .bind(timezone_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn timezone_exists<'e, E>(executor: E, timezone_id: i32) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i32,)> = sqlx::query_as("SELECT id FROM timezones WHERE id = $1")
        .bind(timezone_id)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

pub async fn list_timezones<'e, E>(executor: E) -> Result<Vec<Timezone>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as("SELECT id, name, offset_mins FROM timezones ORDER BY offset_mins, name")
        .fetch_all(executor)
        .await
}

pub async fn has_credentials<'e, E>(executor: E, account_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT account_id FROM twitter_auth WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(executor)
            .await?;
    Ok(row.is_some())
}

/// Decrypt the stored credentials of an account
pub async fn fetch_credentials<'e, E>(
    executor: E,
    account_id: i64,
    cipher: &CredentialCipher,
) -> Result<Option<Credentials>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT pgp_sym_decrypt(token, $2, $3) AS token,
               pgp_sym_decrypt(secret, $2, $3) AS secret
        FROM twitter_auth
        WHERE account_id = $1
        "#,
    )
    .bind(account_id)
    .bind(&cipher.key)
    .bind(&cipher.options)
    .fetch_optional(executor)
    .await
}

/// Encrypt and store credentials, replacing any previous pair
pub async fn store_credentials<'e, E>(
    executor: E,
    account_id: i64,
    credentials: &Credentials,
    cipher: &CredentialCipher,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO twitter_auth (account_id, token, secret)
        VALUES ($1, pgp_sym_encrypt($2, $4, $5), pgp_sym_encrypt($3, $4, $5))
        ON CONFLICT (account_id) DO UPDATE
        SET token = EXCLUDED.token, secret = EXCLUDED.secret, updated_at = NOW()
        "#,
    )
    .bind(account_id)
    .bind(&credentials.token)
    .bind(&credentials.secret)
    .bind(&cipher.key)
    .bind(&cipher.options)
    .execute(executor)
    .await?;
    Ok(())
}

/// Returns the number of rows removed
pub async fn delete_credentials<'e, E>(executor: E, account_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM twitter_auth WHERE account_id = $1")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
