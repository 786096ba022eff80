//! Post domain - DB queries for posts, schedules, drafts, threads and media
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};

use super::models::{
    DraftSummary, DuePost, NewPost, PostRecord, PostStatus, StoredMedia, ThreadUnit, TweetInput,
};

pub async fn insert_post<'e, E>(executor: E, post: &NewPost) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO posts (description, user_id, account_id, post_type, category_id, plug_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(&post.description)
    .bind(post.user_id)
    .bind(post.account_id)
    .bind(post.post_type)
    .bind(post.category_id)
    .bind(post.plug_id)
    .fetch_one(executor)
    .await?;
    Ok(id)
}

/// Returns false when no post with that id belongs to the account
pub async fn update_post<'e, E>(executor: E, post_id: i64, post: &NewPost) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE posts
        SET description = $1, category_id = $2, plug_id = $3, updated_at = NOW()
        WHERE id = $4 AND account_id = $5
        "#,
    )
    .bind(&post.description)
    .bind(post.category_id)
    .bind(post.plug_id)
    .bind(post_id)
    .bind(post.account_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_schedule<'e, E>(
    executor: E,
    post_id: i64,
    account_id: i64,
    timestamp: i64,
    status: PostStatus,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO schedules (post_id, account_id, timestamp, status)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(post_id)
    .bind(account_id)
    .bind(timestamp)
    .bind(status)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn update_schedule_timestamp<'e, E>(
    executor: E,
    post_id: i64,
    account_id: i64,
    timestamp: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE schedules SET timestamp = $1 WHERE post_id = $2 AND account_id = $3",
    )
    .bind(timestamp)
    .bind(post_id)
    .bind(account_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn insert_draft<'e, E>(executor: E, post_id: i64, account_id: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO drafts (post_id, account_id) VALUES ($1, $2)")
        .bind(post_id)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete_draft<'e, E>(executor: E, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM drafts WHERE post_id = $1 AND account_id = $2")
        .bind(post_id)
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

fn thread_columns(tweets: &[TweetInput]) -> (Vec<String>, Vec<i32>) {
    tweets
        .iter()
        .map(|t| (t.tweet.clone(), t.tweet_order))
        .unzip()
}

/// Insert the whole thread as one statement
pub async fn insert_thread<'e, E>(
    executor: E,
    post_id: i64,
    tweets: &[TweetInput],
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (texts, orders) = thread_columns(tweets);
    sqlx::query(
        r#"
        INSERT INTO twitter_posts (post_id, tweet, tweet_order)
        SELECT $1, t.tweet, t.tweet_order
        FROM UNNEST($2::TEXT[], $3::INT[]) AS t(tweet, tweet_order)
        "#,
    )
    .bind(post_id)
    .bind(&texts)
    .bind(&orders)
    .execute(executor)
    .await?;
    Ok(())
}

/// Insert or overwrite each tweet keyed by (post_id, tweet_order)
pub async fn upsert_thread<'e, E>(
    executor: E,
    post_id: i64,
    tweets: &[TweetInput],
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (texts, orders) = thread_columns(tweets);
    sqlx::query(
        r#"
        INSERT INTO twitter_posts (post_id, tweet, tweet_order)
        SELECT $1, t.tweet, t.tweet_order
        FROM UNNEST($2::TEXT[], $3::INT[]) AS t(tweet, tweet_order)
        ON CONFLICT ON CONSTRAINT unique_order_postid
        DO UPDATE SET tweet = EXCLUDED.tweet, tweet_order = EXCLUDED.tweet_order
        "#,
    )
    .bind(post_id)
    .bind(&texts)
    .bind(&orders)
    .execute(executor)
    .await?;
    Ok(())
}

/// Delete tweets past the new thread length
pub async fn truncate_thread<'e, E>(executor: E, post_id: i64, len: i32) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM twitter_posts WHERE post_id = $1 AND tweet_order > $2")
        .bind(post_id)
        .bind(len)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_thread<'e, E>(executor: E, post_id: i64) -> Result<Vec<ThreadUnit>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        "SELECT tweet, tweet_order FROM twitter_posts WHERE post_id = $1 ORDER BY tweet_order ASC",
    )
    .bind(post_id)
    .fetch_all(executor)
    .await
}

/// Stored keys of a post that are not in `keep` and that no other post references
pub async fn stale_media_keys<'e, E>(
    executor: E,
    post_id: i64,
    keep: &[String],
) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT m.key
        FROM twitter_media m
        WHERE m.post_id = $1
          AND NOT (m.key = ANY($2))
          AND NOT EXISTS (
              SELECT 1 FROM twitter_media o WHERE o.key = m.key AND o.post_id <> $1
          )
        ORDER BY m.key
        "#,
    )
    .bind(post_id)
    .bind(keep)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(key,)| key).collect())
}

/// Keys of a post that no other post references
pub async fn exclusive_media_keys<'e, E>(executor: E, post_id: i64) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    stale_media_keys(executor, post_id, &[]).await
}

/// The subset of `keys` referenced by some post of the account
pub async fn owned_media_keys<'e, E>(
    executor: E,
    account_id: i64,
    keys: &[String],
) -> Result<Vec<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT m.key
        FROM twitter_media m
        JOIN posts p ON p.id = m.post_id
        WHERE p.account_id = $1 AND m.key = ANY($2)
        "#,
    )
    .bind(account_id)
    .bind(keys)
    .fetch_all(executor)
    .await?;
    Ok(rows.into_iter().map(|(key,)| key).collect())
}

pub async fn plug_belongs<'e, E>(executor: E, plug_id: i64, account_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM plugs WHERE id = $1 AND account_id = $2)")
            .bind(plug_id)
            .bind(account_id)
            .fetch_one(executor)
            .await?;
    Ok(exists)
}

pub async fn category_belongs<'e, E>(executor: E, category_id: i64, user_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1 AND created_by = $2)")
            .bind(category_id)
            .bind(user_id)
            .fetch_one(executor)
            .await?;
    Ok(exists)
}

pub async fn delete_media<'e, E>(executor: E, post_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM twitter_media WHERE post_id = $1")
        .bind(post_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn insert_media<'e, E>(
    executor: E,
    post_id: i64,
    media: &[StoredMedia],
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let tweet_orders: Vec<i32> = media.iter().map(|m| m.tweet_order).collect();
    let media_orders: Vec<i32> = media.iter().map(|m| m.media_order).collect();
    let keys: Vec<&str> = media.iter().map(|m| m.key.as_str()).collect();
    sqlx::query(
        r#"
        INSERT INTO twitter_media (post_id, tweet_order, media_order, key)
        SELECT $1, m.tweet_order, m.media_order, m.key
        FROM UNNEST($2::INT[], $3::INT[], $4::TEXT[]) AS m(tweet_order, media_order, key)
        "#,
    )
    .bind(post_id)
    .bind(&tweet_orders)
    .bind(&media_orders)
    .bind(&keys)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn fetch_media<'e, E>(executor: E, post_id: i64) -> Result<Vec<StoredMedia>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT tweet_order, media_order, key
        FROM twitter_media
        WHERE post_id = $1
        ORDER BY tweet_order ASC, media_order ASC
        "#,
    )
    .bind(post_id)
    .fetch_all(executor)
    .await
}

pub async fn fetch_post<'e, E>(
    executor: E,
    account_id: i64,
    post_id: i64,
) -> Result<Option<PostRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.id, p.description, p.category_id, p.plug_id, s.timestamp, s.status
        FROM posts p
        JOIN schedules s ON s.post_id = p.id
        WHERE p.id = $1 AND s.account_id = $2
        "#,
    )
    .bind(post_id)
    .bind(account_id)
    .fetch_optional(executor)
    .await
}

/// A draft reads like a post scheduled at `pseudo_timestamp`
pub async fn fetch_draft<'e, E>(
    executor: E,
    account_id: i64,
    post_id: i64,
    pseudo_timestamp: i64,
) -> Result<Option<PostRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.id, p.description, p.category_id, p.plug_id,
               $3::BIGINT AS timestamp, $4::SMALLINT AS status
        FROM posts p
        JOIN drafts d ON d.post_id = p.id
        WHERE p.id = $1 AND d.account_id = $2
        "#,
    )
    .bind(post_id)
    .bind(account_id)
    .bind(pseudo_timestamp)
    .bind(PostStatus::Draft)
    .fetch_optional(executor)
    .await
}

pub async fn fetch_drafts<'e, E>(executor: E, account_id: i64) -> Result<Vec<DraftSummary>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.id, p.description, p.category_id, p.plug_id
        FROM posts p
        JOIN drafts d ON d.post_id = p.id
        WHERE d.account_id = $1
        ORDER BY p.id DESC
        "#,
    )
    .bind(account_id)
    .fetch_all(executor)
    .await
}

/// Scheduled posts of an account with `start <= timestamp <= end`, oldest first
pub async fn scheduled_between<'e, E>(
    executor: E,
    account_id: i64,
    start: i64,
    end: i64,
) -> Result<Vec<PostRecord>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT p.id, p.description, p.category_id, p.plug_id, s.timestamp, s.status
        FROM posts p
        JOIN schedules s ON s.post_id = p.id
        WHERE s.account_id = $1
          AND s.timestamp BETWEEN $2 AND $3
          AND s.status = $4
        ORDER BY s.timestamp ASC
        "#,
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .bind(PostStatus::Scheduled)
    .fetch_all(executor)
    .await
}

/// Content of the plug attached to a post, if the plug belongs to the post's account
pub async fn fetch_plug_content<'e, E>(executor: E, post_id: i64) -> Result<Option<String>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT pl.plug
        FROM posts p
        JOIN plugs pl ON pl.id = p.plug_id AND pl.account_id = p.account_id
        WHERE p.id = $1
        "#,
    )
    .bind(post_id)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|(plug,)| plug))
}

/// SCHEDULED -> DISPATCHING for the account's post. Returns false when the
/// post is missing, belongs elsewhere or is not SCHEDULED.
pub async fn claim_for_dispatch<'e, E>(executor: E, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE schedules SET status = $1 WHERE post_id = $2 AND account_id = $3 AND status = $4",
    )
    .bind(PostStatus::Dispatching)
    .bind(post_id)
    .bind(account_id)
    .bind(PostStatus::Scheduled)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// DISPATCHING -> `outcome`. Returns false when the post is not DISPATCHING.
pub async fn finish_dispatch<'e, E>(executor: E, post_id: i64, outcome: PostStatus) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("UPDATE schedules SET status = $1 WHERE post_id = $2 AND status = $3")
        .bind(outcome)
        .bind(post_id)
        .bind(PostStatus::Dispatching)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Owner-scoped hard delete; schedule, draft, thread and media rows cascade
pub async fn delete_post<'e, E>(executor: E, user_id: i64, post_id: i64) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
        .bind(post_id)
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Scheduled posts whose minute is `timestamp`
pub async fn due_posts<'e, E>(executor: E, timestamp: i64) -> Result<Vec<DuePost>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as(
        r#"
        SELECT post_id, account_id
        FROM schedules
        WHERE timestamp = $1 AND status = $2
        ORDER BY post_id
        "#,
    )
    .bind(timestamp)
    .bind(PostStatus::Scheduled)
    .fetch_all(executor)
    .await
}
