//! Datastore seam for the post core.
//!
//! `PostStore` covers single-statement reads and status writes; `PostTx`
//! groups the writes of one multi-table mutation. Dropping a `PostTx`
//! without calling `commit` rolls everything back.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{
    DraftSummary, DuePost, NewPost, PostRecord, PostStatus, StoredMedia, ThreadUnit, TweetInput,
};
use super::queries;
use crate::domain::accounts::{self, CredentialCipher, Credentials};

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn PostTx>, sqlx::Error>;

    async fn has_credentials(&self, account_id: i64) -> Result<bool, sqlx::Error>;
    async fn credentials(&self, account_id: i64) -> Result<Option<Credentials>, sqlx::Error>;
    async fn offset_minutes(&self, user_id: i64) -> Result<i32, sqlx::Error>;

    async fn fetch_post(&self, account_id: i64, post_id: i64) -> Result<Option<PostRecord>, sqlx::Error>;
    async fn fetch_draft(
        &self,
        account_id: i64,
        post_id: i64,
        pseudo_timestamp: i64,
    ) -> Result<Option<PostRecord>, sqlx::Error>;
    async fn fetch_drafts(&self, account_id: i64) -> Result<Vec<DraftSummary>, sqlx::Error>;
    async fn fetch_thread(&self, post_id: i64) -> Result<Vec<ThreadUnit>, sqlx::Error>;
    async fn fetch_media(&self, post_id: i64) -> Result<Vec<StoredMedia>, sqlx::Error>;
    /// Keys of the post that no other post references
    async fn exclusive_media_keys(&self, post_id: i64) -> Result<Vec<String>, sqlx::Error>;
    async fn fetch_plug_content(&self, post_id: i64) -> Result<Option<String>, sqlx::Error>;
    async fn scheduled_between(
        &self,
        account_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<PostRecord>, sqlx::Error>;
    async fn due_posts(&self, timestamp: i64) -> Result<Vec<DuePost>, sqlx::Error>;

    /// SCHEDULED -> DISPATCHING, scoped to the account. Returns false when
    /// the post is not the account's or is not SCHEDULED.
    async fn claim_for_dispatch(&self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error>;
    /// DISPATCHING -> `outcome`; returns false when the post is not DISPATCHING
    async fn finish_dispatch(&self, post_id: i64, outcome: PostStatus) -> Result<bool, sqlx::Error>;
    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<u64, sqlx::Error>;
}

#[async_trait]
pub trait PostTx: Send {
    async fn insert_post(&mut self, post: &NewPost) -> Result<i64, sqlx::Error>;
    async fn update_post(&mut self, post_id: i64, post: &NewPost) -> Result<bool, sqlx::Error>;
    async fn insert_schedule(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
        status: PostStatus,
    ) -> Result<(), sqlx::Error>;
    async fn update_schedule_timestamp(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
    ) -> Result<bool, sqlx::Error>;
    async fn insert_draft(&mut self, post_id: i64, account_id: i64) -> Result<(), sqlx::Error>;
    async fn delete_draft(&mut self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error>;
    async fn insert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error>;
    async fn upsert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error>;
    async fn truncate_thread(&mut self, post_id: i64, len: i32) -> Result<u64, sqlx::Error>;
    /// Keys of the post outside `keep` that no other post references
    async fn stale_media_keys(&mut self, post_id: i64, keep: &[String]) -> Result<Vec<String>, sqlx::Error>;
    /// The subset of `keys` referenced by posts of the account
    async fn owned_media_keys(&mut self, account_id: i64, keys: &[String]) -> Result<Vec<String>, sqlx::Error>;
    async fn plug_belongs(&mut self, plug_id: i64, account_id: i64) -> Result<bool, sqlx::Error>;
    async fn category_belongs(&mut self, category_id: i64, user_id: i64) -> Result<bool, sqlx::Error>;
    async fn delete_media(&mut self, post_id: i64) -> Result<u64, sqlx::Error>;
    async fn insert_media(&mut self, post_id: i64, media: &[StoredMedia]) -> Result<(), sqlx::Error>;
    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct PgPostStore {
    pool: PgPool,
    cipher: CredentialCipher,
}

impl PgPostStore {
    pub fn new(pool: PgPool, cipher: CredentialCipher) -> Self {
        Self { pool, cipher }
    }
}

#[async_trait]
impl PostStore for PgPostStore {
    async fn begin(&self) -> Result<Box<dyn PostTx>, sqlx::Error> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPostTx { tx }))
    }

    async fn has_credentials(&self, account_id: i64) -> Result<bool, sqlx::Error> {
        accounts::has_credentials(&self.pool, account_id).await
    }

    async fn credentials(&self, account_id: i64) -> Result<Option<Credentials>, sqlx::Error> {
        accounts::fetch_credentials(&self.pool, account_id, &self.cipher).await
    }

    async fn offset_minutes(&self, user_id: i64) -> Result<i32, sqlx::Error> {
        accounts::offset_minutes(&self.pool, user_id).await
    }

    async fn fetch_post(&self, account_id: i64, post_id: i64) -> Result<Option<PostRecord>, sqlx::Error> {
        queries::fetch_post(&self.pool, account_id, post_id).await
    }

    async fn fetch_draft(
        &self,
        account_id: i64,
        post_id: i64,
        pseudo_timestamp: i64,
    ) -> Result<Option<PostRecord>, sqlx::Error> {
        queries::fetch_draft(&self.pool, account_id, post_id, pseudo_timestamp).await
    }

    async fn fetch_drafts(&self, account_id: i64) -> Result<Vec<DraftSummary>, sqlx::Error> {
        queries::fetch_drafts(&self.pool, account_id).await
    }

    async fn fetch_thread(&self, post_id: i64) -> Result<Vec<ThreadUnit>, sqlx::Error> {
        queries::fetch_thread(&self.pool, post_id).await
    }

    async fn fetch_media(&self, post_id: i64) -> Result<Vec<StoredMedia>, sqlx::Error> {
        queries::fetch_media(&self.pool, post_id).await
    }

    async fn exclusive_media_keys(&self, post_id: i64) -> Result<Vec<String>, sqlx::Error> {
        queries::exclusive_media_keys(&self.pool, post_id).await
    }

    async fn fetch_plug_content(&self, post_id: i64) -> Result<Option<String>, sqlx::Error> {
        queries::fetch_plug_content(&self.pool, post_id).await
    }

    async fn scheduled_between(
        &self,
        account_id: i64,
        start: i64,
        end: i64,
    ) -> Result<Vec<PostRecord>, sqlx::Error> {
        queries::scheduled_between(&self.pool, account_id, start, end).await
    }

    async fn due_posts(&self, timestamp: i64) -> Result<Vec<DuePost>, sqlx::Error> {
        queries::due_posts(&self.pool, timestamp).await
    }

    async fn claim_for_dispatch(&self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        queries::claim_for_dispatch(&self.pool, post_id, account_id).await
    }

    async fn finish_dispatch(&self, post_id: i64, outcome: PostStatus) -> Result<bool, sqlx::Error> {
        queries::finish_dispatch(&self.pool, post_id, outcome).await
    }

    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<u64, sqlx::Error> {
        queries::delete_post(&self.pool, user_id, post_id).await
    }
}

pub struct PgPostTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PostTx for PgPostTx {
    async fn insert_post(&mut self, post: &NewPost) -> Result<i64, sqlx::Error> {
        queries::insert_post(&mut *self.tx, post).await
    }

    async fn update_post(&mut self, post_id: i64, post: &NewPost) -> Result<bool, sqlx::Error> {
        queries::update_post(&mut *self.tx, post_id, post).await
    }

    async fn insert_schedule(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
        status: PostStatus,
    ) -> Result<(), sqlx::Error> {
        queries::insert_schedule(&mut *self.tx, post_id, account_id, timestamp, status).await
    }

    async fn update_schedule_timestamp(
        &mut self,
        post_id: i64,
        account_id: i64,
        timestamp: i64,
    ) -> Result<bool, sqlx::Error> {
        queries::update_schedule_timestamp(&mut *self.tx, post_id, account_id, timestamp).await
    }

    async fn insert_draft(&mut self, post_id: i64, account_id: i64) -> Result<(), sqlx::Error> {
        queries::insert_draft(&mut *self.tx, post_id, account_id).await
    }

    async fn delete_draft(&mut self, post_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        queries::delete_draft(&mut *self.tx, post_id, account_id).await
    }

    async fn insert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error> {
        queries::insert_thread(&mut *self.tx, post_id, tweets).await
    }

    async fn upsert_thread(&mut self, post_id: i64, tweets: &[TweetInput]) -> Result<(), sqlx::Error> {
        queries::upsert_thread(&mut *self.tx, post_id, tweets).await
    }

    async fn truncate_thread(&mut self, post_id: i64, len: i32) -> Result<u64, sqlx::Error> {
        queries::truncate_thread(&mut *self.tx, post_id, len).await
    }

    async fn stale_media_keys(&mut self, post_id: i64, keep: &[String]) -> Result<Vec<String>, sqlx::Error> {
        queries::stale_media_keys(&mut *self.tx, post_id, keep).await
    }

    async fn owned_media_keys(&mut self, account_id: i64, keys: &[String]) -> Result<Vec<String>, sqlx::Error> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        queries::owned_media_keys(&mut *self.tx, account_id, keys).await
    }

    async fn plug_belongs(&mut self, plug_id: i64, account_id: i64) -> Result<bool, sqlx::Error> {
        queries::plug_belongs(&mut *self.tx, plug_id, account_id).await
    }

    async fn category_belongs(&mut self, category_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
        queries::category_belongs(&mut *self.tx, category_id, user_id).await
    }

    async fn delete_media(&mut self, post_id: i64) -> Result<u64, sqlx::Error> {
        queries::delete_media(&mut *self.tx, post_id).await
    }

    async fn insert_media(&mut self, post_id: i64, media: &[StoredMedia]) -> Result<(), sqlx::Error> {
        if media.is_empty() {
            return Ok(());
        }
        queries::insert_media(&mut *self.tx, post_id, media).await
    }

    async fn commit(self: Box<Self>) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
