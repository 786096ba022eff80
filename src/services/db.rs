//! Database pool and schema setup
//!
//! Domain functions take a generic `Executor`, so they run against either
//! `&PgPool` or a transaction (`&mut *tx`):
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! accounts::insert_member(&mut *tx, account_id, user_id).await?;
//! tx.commit().await?;
//! ```

use sqlx::PgPool;
use sqlx::migrate::MigrateError;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Apply the embedded schema migrations
pub async fn migrate(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
