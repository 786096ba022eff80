//! Thread store: writes the ordered tweets of a post inside the caller's transaction

use super::models::TweetInput;
use super::store::PostTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fresh post: every tweet is a new row
    Create,
    /// Edited post: overwrite by (post, order), then drop orders past the new length
    Upsert,
}

pub async fn write_thread(
    tx: &mut dyn PostTx,
    post_id: i64,
    tweets: &[TweetInput],
    mode: WriteMode,
) -> Result<(), sqlx::Error> {
    match mode {
        WriteMode::Create => tx.insert_thread(post_id, tweets).await,
        WriteMode::Upsert => {
            tx.upsert_thread(post_id, tweets).await?;
            // validated threads always fit; saturating keeps every row otherwise
            let len = i32::try_from(tweets.len()).unwrap_or(i32::MAX);
            let removed = tx.truncate_thread(post_id, len).await?;
            if removed > 0 {
                tracing::debug!(post_id, removed, "Truncated thread");
            }
            Ok(())
        }
    }
}
