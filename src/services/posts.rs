//! Post/schedule transaction manager.
//!
//! Every mutation that spans posts, schedules, drafts, threads and media runs
//! inside one `PostTx`. Blobs uploaded for a transaction that then fails are
//! removed again; blobs an edit stops referencing are purged once it commits,
//! unless another post still references them.

use crate::constants::{DRAFT_PSEUDO_OFFSET_SECS, TWITTER_POST_TYPE};
use crate::domain::media::{PreparedMedia, prepare_media, store_prepared};
use crate::domain::posts::models::{
    DraftSummary, NewPost, PostPayload, PostStatus, PostView, StoredMedia, ThreadContent,
};
use crate::domain::posts::store::PostTx;
use crate::domain::posts::thread::{WriteMode, write_thread};
use crate::domain::timestamps::schedule_timestamp;
use crate::services::error::ServiceError;
use crate::services::{Actor, PostContext};
use crate::storage::ObjectStore;

/// Where a new post is bound
enum Binding {
    Schedule(i64),
    Draft,
}

pub async fn create_post(
    ctx: &PostContext,
    actor: Actor,
    payload: &PostPayload,
) -> Result<i64, ServiceError> {
    ensure_connected(ctx, actor).await?;
    payload.validate(ctx.clock.now())?;
    let timestamp = schedule_timestamp(payload.timestamp);
    let post_id = create(ctx, actor, &payload.content, Binding::Schedule(timestamp)).await?;
    tracing::info!(post_id, account_id = actor.account_id, timestamp, "Scheduled post");
    Ok(post_id)
}

pub async fn create_draft(
    ctx: &PostContext,
    actor: Actor,
    content: &ThreadContent,
) -> Result<i64, ServiceError> {
    ensure_connected(ctx, actor).await?;
    content.validate()?;
    let post_id = create(ctx, actor, content, Binding::Draft).await?;
    tracing::info!(post_id, account_id = actor.account_id, "Created draft");
    Ok(post_id)
}

pub async fn edit_post(
    ctx: &PostContext,
    actor: Actor,
    post_id: i64,
    payload: &PostPayload,
) -> Result<(), ServiceError> {
    payload.validate(ctx.clock.now())?;
    let timestamp = schedule_timestamp(payload.timestamp);
    edit(ctx, actor, post_id, &payload.content, Some(timestamp)).await
}

pub async fn edit_draft(
    ctx: &PostContext,
    actor: Actor,
    post_id: i64,
    content: &ThreadContent,
) -> Result<(), ServiceError> {
    content.validate()?;
    ensure_draft(ctx, actor, post_id).await?;
    edit(ctx, actor, post_id, content, None).await
}

/// Apply the draft edit, then bind the post to a schedule and drop the draft row.
pub async fn convert_draft(
    ctx: &PostContext,
    actor: Actor,
    post_id: i64,
    payload: &PostPayload,
) -> Result<(), ServiceError> {
    payload.validate(ctx.clock.now())?;
    edit_draft(ctx, actor, post_id, &payload.content).await?;

    let timestamp = schedule_timestamp(payload.timestamp);
    let mut tx = ctx.store.begin().await?;
    tx.insert_schedule(post_id, actor.account_id, timestamp, PostStatus::Scheduled)
        .await?;
    if !tx.delete_draft(post_id, actor.account_id).await? {
        return Err(ServiceError::DraftNotFound);
    }
    tx.commit().await?;

    tracing::info!(post_id, account_id = actor.account_id, timestamp, "Converted draft to post");
    Ok(())
}

/// Owner-scoped delete. Deleting a missing post is not an error. Blobs still
/// referenced by another post are kept.
pub async fn delete_post(ctx: &PostContext, actor: Actor, post_id: i64) -> Result<(), ServiceError> {
    let keys = ctx.store.exclusive_media_keys(post_id).await?;
    let removed = ctx.store.delete_post(actor.user_id, post_id).await?;
    if removed > 0 {
        purge_blobs(ctx.objects.as_ref(), post_id, &keys).await;
        tracing::info!(post_id, user_id = actor.user_id, "Deleted post");
    }
    Ok(())
}

pub async fn fetch_post(ctx: &PostContext, actor: Actor, post_id: i64) -> Result<PostView, ServiceError> {
    let post = ctx
        .store
        .fetch_post(actor.account_id, post_id)
        .await?
        .ok_or(ServiceError::PostNotFound)?;
    let thread = ctx.store.fetch_thread(post_id).await?;
    let media = ctx.store.fetch_media(post_id).await?;
    Ok(PostView::assemble(post, thread, media))
}

/// Drafts have no timestamp; they read as due a few minutes from now
pub async fn fetch_draft(ctx: &PostContext, actor: Actor, post_id: i64) -> Result<PostView, ServiceError> {
    let pseudo_timestamp = ctx.clock.now() + DRAFT_PSEUDO_OFFSET_SECS;
    let draft = ctx
        .store
        .fetch_draft(actor.account_id, post_id, pseudo_timestamp)
        .await?
        .ok_or(ServiceError::DraftNotFound)?;
    let thread = ctx.store.fetch_thread(post_id).await?;
    let media = ctx.store.fetch_media(post_id).await?;
    Ok(PostView::assemble(draft, thread, media))
}

pub async fn fetch_drafts(ctx: &PostContext, actor: Actor) -> Result<Vec<DraftSummary>, ServiceError> {
    Ok(ctx.store.fetch_drafts(actor.account_id).await?)
}

async fn ensure_connected(ctx: &PostContext, actor: Actor) -> Result<(), ServiceError> {
    if ctx.store.has_credentials(actor.account_id).await? {
        Ok(())
    } else {
        Err(ServiceError::NotConnected)
    }
}

async fn ensure_draft(ctx: &PostContext, actor: Actor, post_id: i64) -> Result<(), ServiceError> {
    ctx.store
        .fetch_draft(actor.account_id, post_id, 0)
        .await?
        .map(|_| ())
        .ok_or(ServiceError::DraftNotFound)
}

fn prepare_all(ctx: &PostContext, content: &ThreadContent) -> Result<Vec<PreparedMedia>, ServiceError> {
    content
        .all_media()
        .iter()
        .map(|item| prepare_media(item, &ctx.media_prefix))
        .collect()
}

/// The plug, the category and every reused media key must belong to the actor
async fn check_references(
    tx: &mut dyn PostTx,
    actor: Actor,
    content: &ThreadContent,
    prepared: &[PreparedMedia],
) -> Result<(), ServiceError> {
    if let Some(plug_id) = content.plug_id {
        if !tx.plug_belongs(plug_id, actor.account_id).await? {
            return Err(ServiceError::NotFound("Plug"));
        }
    }
    if let Some(category_id) = content.category_id {
        if !tx.category_belongs(category_id, actor.user_id).await? {
            return Err(ServiceError::NotFound("Category"));
        }
    }

    let reused = reused_keys(prepared);
    let owned = tx.owned_media_keys(actor.account_id, &reused).await?;
    if reused.iter().any(|key| !owned.contains(key)) {
        return Err(ServiceError::NotFound("Media"));
    }
    Ok(())
}

/// Keys of items that point at blobs already in the store
fn reused_keys(prepared: &[PreparedMedia]) -> Vec<String> {
    prepared
        .iter()
        .filter(|p| p.upload.is_none())
        .map(|p| p.record.key.clone())
        .collect()
}

fn new_post(actor: Actor, content: &ThreadContent) -> NewPost {
    NewPost {
        description: content.description(),
        user_id: actor.user_id,
        account_id: actor.account_id,
        post_type: TWITTER_POST_TYPE,
        category_id: content.category_id,
        plug_id: content.plug_id,
    }
}

async fn create(
    ctx: &PostContext,
    actor: Actor,
    content: &ThreadContent,
    binding: Binding,
) -> Result<i64, ServiceError> {
    let prepared = prepare_all(ctx, content)?;
    let mut uploaded = Vec::new();

    let result = create_in_tx(ctx, actor, content, binding, &prepared, &mut uploaded).await;
    if result.is_err() {
        discard_uploads(ctx.objects.as_ref(), &uploaded).await;
    }
    result
}

async fn create_in_tx(
    ctx: &PostContext,
    actor: Actor,
    content: &ThreadContent,
    binding: Binding,
    prepared: &[PreparedMedia],
    uploaded: &mut Vec<String>,
) -> Result<i64, ServiceError> {
    let mut tx = ctx.store.begin().await?;
    check_references(tx.as_mut(), actor, content, prepared).await?;

    let post_id = tx.insert_post(&new_post(actor, content)).await?;
    match binding {
        Binding::Schedule(timestamp) => {
            tx.insert_schedule(post_id, actor.account_id, timestamp, PostStatus::Scheduled)
                .await?
        }
        Binding::Draft => tx.insert_draft(post_id, actor.account_id).await?,
    }
    write_thread(tx.as_mut(), post_id, &content.ordered_tweets(), WriteMode::Create).await?;
    attach_media(ctx, tx.as_mut(), post_id, prepared, uploaded).await?;

    tx.commit().await?;
    Ok(post_id)
}

async fn edit(
    ctx: &PostContext,
    actor: Actor,
    post_id: i64,
    content: &ThreadContent,
    timestamp: Option<i64>,
) -> Result<(), ServiceError> {
    let prepared = prepare_all(ctx, content)?;
    let mut uploaded = Vec::new();

    match edit_in_tx(ctx, actor, post_id, content, timestamp, &prepared, &mut uploaded).await {
        Ok(stale) => {
            purge_blobs(ctx.objects.as_ref(), post_id, &stale).await;
            tracing::info!(post_id, account_id = actor.account_id, purged = stale.len(), "Edited post");
            Ok(())
        }
        Err(e) => {
            discard_uploads(ctx.objects.as_ref(), &uploaded).await;
            Err(e)
        }
    }
}

/// Returns the keys the post no longer references
async fn edit_in_tx(
    ctx: &PostContext,
    actor: Actor,
    post_id: i64,
    content: &ThreadContent,
    timestamp: Option<i64>,
    prepared: &[PreparedMedia],
    uploaded: &mut Vec<String>,
) -> Result<Vec<String>, ServiceError> {
    let mut tx = ctx.store.begin().await?;

    if !tx.update_post(post_id, &new_post(actor, content)).await? {
        return Err(ServiceError::PostNotFound);
    }
    if let Some(timestamp) = timestamp {
        if !tx
            .update_schedule_timestamp(post_id, actor.account_id, timestamp)
            .await?
        {
            return Err(ServiceError::PostNotFound);
        }
    }

    check_references(tx.as_mut(), actor, content, prepared).await?;

    // snapshot stale keys before the rows that reference them go away
    let stale = tx.stale_media_keys(post_id, &reused_keys(prepared)).await?;
    tx.delete_media(post_id).await?;

    write_thread(tx.as_mut(), post_id, &content.ordered_tweets(), WriteMode::Upsert).await?;
    attach_media(ctx, tx.as_mut(), post_id, prepared, uploaded).await?;

    tx.commit().await?;
    Ok(stale)
}

/// Upload new blobs, then insert every media row in one batch
async fn attach_media(
    ctx: &PostContext,
    tx: &mut dyn PostTx,
    post_id: i64,
    prepared: &[PreparedMedia],
    uploaded: &mut Vec<String>,
) -> Result<(), ServiceError> {
    if prepared.is_empty() {
        return Ok(());
    }

    for item in prepared {
        store_prepared(ctx.objects.as_ref(), item).await?;
        if item.upload.is_some() {
            uploaded.push(item.record.key.clone());
        }
    }

    let records: Vec<StoredMedia> = prepared.iter().map(|p| p.record.clone()).collect();
    tx.insert_media(post_id, &records).await?;
    Ok(())
}

async fn purge_blobs(objects: &dyn ObjectStore, post_id: i64, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Err(e) = objects.delete_many(keys).await {
        // rows are already gone; the blobs are orphaned, not referenced
        tracing::warn!(post_id, count = keys.len(), error = %e, "Failed to purge media blobs");
    }
}

async fn discard_uploads(objects: &dyn ObjectStore, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    if let Err(e) = objects.delete_many(keys).await {
        tracing::warn!(count = keys.len(), error = %e, "Failed to remove uploads of a rolled back write");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use image::ImageFormat;

    use super::*;
    use crate::constants::MEDIA_KEY_PREFIX;
    use crate::domain::accounts::Credentials;
    use crate::domain::media::{MediaInput, encoded_image};
    use crate::domain::posts::memory::{FailPoint, MemoryPostStore};
    use crate::domain::posts::models::TweetInput;
    use crate::services::clock::FixedClock;
    use crate::services::twitter::MockPublisher;
    use crate::storage::MemoryStore;

    const NOW: i64 = 1_700_000_000;
    const ACTOR: Actor = Actor {
        user_id: 10,
        account_id: 20,
    };
    const OTHER: Actor = Actor {
        user_id: 11,
        account_id: 21,
    };

    struct Harness {
        store: MemoryPostStore,
        objects: Arc<MemoryStore>,
        ctx: PostContext,
    }

    fn harness_with(objects: MemoryStore) -> Harness {
        let store = MemoryPostStore::default();
        let objects = Arc::new(objects);
        let ctx = PostContext {
            store: Arc::new(store.clone()),
            objects: objects.clone(),
            publisher: Arc::new(MockPublisher::new()),
            clock: Arc::new(FixedClock(NOW)),
            media_prefix: MEDIA_KEY_PREFIX.to_string(),
        };
        Harness { store, objects, ctx }
    }

    fn connected() -> Harness {
        let h = harness_with(MemoryStore::default());
        h.store.connect(
            ACTOR.account_id,
            Credentials {
                token: "t".into(),
                secret: "s".into(),
            },
        );
        h
    }

    fn tweets(texts: &[&str]) -> Vec<TweetInput> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| TweetInput {
                tweet: text.to_string(),
                tweet_order: i as i32 + 1,
                media: vec![],
            })
            .collect()
    }

    fn payload(timestamp: i64, texts: &[&str], media: Vec<MediaInput>) -> PostPayload {
        PostPayload {
            timestamp,
            recurring: false,
            content: ThreadContent {
                category_id: None,
                plug_id: None,
                tweets: tweets(texts),
                media,
            },
        }
    }

    fn new_png(tweet_order: i32, media_order: i32) -> MediaInput {
        MediaInput {
            newly_added: true,
            url: encoded_image(ImageFormat::Png),
            tweet_order,
            media_order,
        }
    }

    /// Keys of a post in slot order
    fn media_keys(h: &Harness, post_id: i64) -> Vec<String> {
        h.store
            .tables()
            .media
            .iter()
            .filter(|((id, _, _), _)| *id == post_id)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn existing(key: &str, tweet_order: i32, media_order: i32) -> MediaInput {
        MediaInput {
            newly_added: false,
            url: format!("https://bucket.s3.amazonaws.com/{}", key),
            tweet_order,
            media_order,
        }
    }

    #[tokio::test]
    async fn create_post_writes_post_schedule_and_thread() {
        let h = connected();
        let post_id = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["Hello", "World"], vec![]))
            .await
            .unwrap();

        let tables = h.store.tables();
        assert_eq!(tables.posts.len(), 1);
        assert_eq!(tables.posts[&post_id].description, "Hello");

        let schedule = &tables.schedules[&post_id];
        assert_eq!(schedule.status, PostStatus::Scheduled);
        assert_eq!(schedule.timestamp, (NOW + 600) / 60 * 60);
        assert_eq!(schedule.account_id, ACTOR.account_id);

        let thread: Vec<(i32, &str)> = tables
            .thread
            .iter()
            .map(|((_, order), text)| (*order, text.as_str()))
            .collect();
        assert_eq!(thread, vec![(1, "Hello"), (2, "World")]);
        assert!(tables.media.is_empty());
    }

    #[tokio::test]
    async fn create_post_requires_connected_account() {
        let h = harness_with(MemoryStore::default());
        let err = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotConnected));
        assert!(h.store.tables().posts.is_empty());
        assert!(h.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn create_post_rejects_past_timestamp_before_writing() {
        let h = connected();
        let err = create_post(&h.ctx, ACTOR, &payload(NOW - 1, &["a"], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(h.store.tables().posts.is_empty());
    }

    #[tokio::test]
    async fn failure_at_any_step_leaves_no_post() {
        for point in [
            FailPoint::InsertPost,
            FailPoint::InsertSchedule,
            FailPoint::InsertThread,
            FailPoint::InsertMedia,
            FailPoint::Commit,
        ] {
            let h = connected();
            h.store.fail_on(point);

            let result = create_post(
                &h.ctx,
                ACTOR,
                &payload(NOW + 600, &["a", "b"], vec![new_png(1, 1)]),
            )
            .await;

            assert!(result.is_err(), "{point:?} should abort");
            let tables = h.store.tables();
            assert!(tables.posts.is_empty(), "{point:?} left a post");
            assert!(tables.schedules.is_empty());
            assert!(tables.thread.is_empty());
            assert!(tables.media.is_empty());
            assert!(h.objects.keys().is_empty(), "{point:?} left an upload");
        }
    }

    #[tokio::test]
    async fn rejected_media_format_writes_nothing() {
        let h = connected();
        let bmp = MediaInput {
            newly_added: true,
            url: encoded_image(ImageFormat::Bmp),
            tweet_order: 1,
            media_order: 1,
        };
        let err = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 2), bmp]))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::FileType));
        assert!(h.store.tables().posts.is_empty());
        assert!(h.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn failed_upload_aborts_post() {
        let h = connected();
        h.objects
            .fail_puts
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let err = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)));
        assert!(h.store.tables().posts.is_empty());
    }

    #[tokio::test]
    async fn create_post_uploads_new_media_under_prefix() {
        let h = connected();
        let post_id = create_post(
            &h.ctx,
            ACTOR,
            &payload(NOW + 600, &["a", "b"], vec![new_png(2, 1), new_png(2, 2)]),
        )
        .await
        .unwrap();

        let media = h.store.tables().media;
        assert_eq!(media.len(), 2);
        for ((id, tweet_order, _), key) in &media {
            assert_eq!((*id, *tweet_order), (post_id, 2));
            assert!(key.starts_with(MEDIA_KEY_PREFIX));
            assert!(h.objects.contains(key));
        }
    }

    #[tokio::test]
    async fn edit_truncates_thread_and_purges_omitted_media() {
        let h = connected();
        let post_id = create_post(
            &h.ctx,
            ACTOR,
            &payload(NOW + 600, &["one", "two", "three", "four"], vec![new_png(1, 1), new_png(2, 1)]),
        )
        .await
        .unwrap();
        let (key_a, key_b) = match media_keys(&h, post_id).as_slice() {
            [a, b] => (a.clone(), b.clone()),
            other => panic!("expected two keys, got {other:?}"),
        };

        edit_post(
            &h.ctx,
            ACTOR,
            post_id,
            &payload(NOW + 3600, &["uno", "dos"], vec![existing(&key_b, 1, 1)]),
        )
        .await
        .unwrap();

        let tables = h.store.tables();
        let thread: Vec<(i32, &str)> = tables
            .thread
            .iter()
            .map(|((_, order), text)| (*order, text.as_str()))
            .collect();
        assert_eq!(thread, vec![(1, "uno"), (2, "dos")]);
        assert_eq!(tables.schedules[&post_id].timestamp, (NOW + 3600) / 60 * 60);
        assert_eq!(tables.posts[&post_id].description, "uno");

        assert_eq!(media_keys(&h, post_id), vec![key_b.clone()]);
        assert!(!h.objects.contains(&key_a));
        assert!(h.objects.contains(&key_b));
    }

    #[tokio::test]
    async fn edit_with_no_unchanged_media_purges_everything() {
        let h = connected();
        let post_id = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap();

        edit_post(&h.ctx, ACTOR, post_id, &payload(NOW + 600, &["a"], vec![]))
            .await
            .unwrap();

        assert!(h.store.tables().media.is_empty());
        assert!(h.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn failed_edit_keeps_rows_and_blobs() {
        let h = connected();
        let post_id = create_post(
            &h.ctx,
            ACTOR,
            &payload(NOW + 600, &["a", "b", "c"], vec![new_png(1, 1)]),
        )
        .await
        .unwrap();
        let keys = media_keys(&h, post_id);

        h.store.fail_on(FailPoint::InsertMedia);
        let result = edit_post(
            &h.ctx,
            ACTOR,
            post_id,
            &payload(NOW + 600, &["x"], vec![new_png(1, 1)]),
        )
        .await;
        assert!(result.is_err());

        let tables = h.store.tables();
        assert_eq!(tables.thread.len(), 3);
        assert_eq!(tables.media.len(), 1);
        assert_eq!(h.objects.keys(), keys);
    }

    #[tokio::test]
    async fn shared_blob_survives_edit_of_one_post() {
        let h = connected();
        let first = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap();
        let key = media_keys(&h, first).remove(0);
        let second = create_post(&h.ctx, ACTOR, &payload(NOW + 900, &["b"], vec![existing(&key, 1, 1)]))
            .await
            .unwrap();

        edit_post(&h.ctx, ACTOR, first, &payload(NOW + 600, &["a"], vec![]))
            .await
            .unwrap();
        assert!(media_keys(&h, first).is_empty());
        assert_eq!(media_keys(&h, second), vec![key.clone()]);
        assert!(h.objects.contains(&key));

        // the last reference going away releases the blob
        edit_post(&h.ctx, ACTOR, second, &payload(NOW + 900, &["b"], vec![]))
            .await
            .unwrap();
        assert!(!h.objects.contains(&key));
    }

    #[tokio::test]
    async fn shared_blob_survives_delete_of_one_post() {
        let h = connected();
        let first = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap();
        let key = media_keys(&h, first).remove(0);
        let second = create_post(&h.ctx, ACTOR, &payload(NOW + 900, &["b"], vec![existing(&key, 1, 1)]))
            .await
            .unwrap();

        delete_post(&h.ctx, ACTOR, first).await.unwrap();
        assert!(h.objects.contains(&key));
        assert_eq!(media_keys(&h, second), vec![key.clone()]);

        delete_post(&h.ctx, ACTOR, second).await.unwrap();
        assert!(!h.objects.contains(&key));
    }

    #[tokio::test]
    async fn media_of_another_account_cannot_be_reused() {
        let h = connected();
        h.store.connect(
            OTHER.account_id,
            Credentials {
                token: "t".into(),
                secret: "s".into(),
            },
        );
        let theirs = create_post(&h.ctx, OTHER, &payload(NOW + 600, &["x"], vec![new_png(1, 1)]))
            .await
            .unwrap();
        let key = media_keys(&h, theirs).remove(0);

        let err = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![existing(&key, 1, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Media")));
        assert_eq!(h.store.tables().posts.len(), 1);

        let mine = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![]))
            .await
            .unwrap();
        let err = edit_post(&h.ctx, ACTOR, mine, &payload(NOW + 600, &["b"], vec![existing(&key, 1, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Media")));
        assert!(media_keys(&h, mine).is_empty());
        assert_eq!(h.store.tables().thread[&(mine, 1)], "a");

        // deleting their post still releases their blob
        delete_post(&h.ctx, OTHER, theirs).await.unwrap();
        assert!(!h.objects.contains(&key));
    }

    #[tokio::test]
    async fn unknown_media_key_is_rejected() {
        let h = connected();
        let err = create_post(
            &h.ctx,
            ACTOR,
            &payload(NOW + 600, &["a"], vec![existing("twitter_images/never.png", 1, 1)]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Media")));
        assert!(h.store.tables().posts.is_empty());
    }

    #[tokio::test]
    async fn plug_and_category_must_belong_to_the_actor() {
        let h = connected();
        h.store.add_plug(1, ACTOR.account_id, "mine");
        h.store.add_plug(2, OTHER.account_id, "theirs");
        h.store.add_category(3, ACTOR.user_id);
        h.store.add_category(4, OTHER.user_id);

        let with = |plug_id, category_id| {
            let mut p = payload(NOW + 600, &["a"], vec![]);
            p.content.plug_id = plug_id;
            p.content.category_id = category_id;
            p
        };

        let err = create_post(&h.ctx, ACTOR, &with(Some(2), None)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Plug")));
        let err = create_draft(&h.ctx, ACTOR, &with(None, Some(4)).content)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Category")));
        assert!(h.store.tables().posts.is_empty());

        let post_id = create_post(&h.ctx, ACTOR, &with(Some(1), Some(3))).await.unwrap();
        let err = edit_post(&h.ctx, ACTOR, post_id, &with(Some(2), Some(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound("Plug")));

        let tables = h.store.tables();
        let post = &tables.posts[&post_id];
        assert_eq!((post.plug_id, post.category_id), (Some(1), Some(3)));
    }

    #[tokio::test]
    async fn edit_of_unknown_post_is_not_found() {
        let h = connected();
        let err = edit_post(&h.ctx, ACTOR, 404, &payload(NOW + 600, &["a"], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::PostNotFound));
    }

    #[tokio::test]
    async fn thread_orders_stay_unique_across_edits() {
        let h = connected();
        let post_id = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a", "b"], vec![]))
            .await
            .unwrap();
        for texts in [&["x", "y", "z"][..], &["p"][..], &["q", "r"][..]] {
            edit_post(&h.ctx, ACTOR, post_id, &payload(NOW + 600, texts, vec![]))
                .await
                .unwrap();
            let orders: Vec<i32> = h
                .store
                .tables()
                .thread
                .keys()
                .filter(|(id, _)| *id == post_id)
                .map(|(_, order)| *order)
                .collect();
            let expected: Vec<i32> = (1..=texts.len() as i32).collect();
            assert_eq!(orders, expected);
        }
    }

    #[tokio::test]
    async fn draft_lifecycle_ends_scheduled() {
        let h = connected();
        let content = payload(0, &["draft one"], vec![]).content;
        let post_id = create_draft(&h.ctx, ACTOR, &content).await.unwrap();

        let tables = h.store.tables();
        assert_eq!(tables.drafts.get(&post_id), Some(&ACTOR.account_id));
        assert!(tables.schedules.is_empty());

        let view = fetch_draft(&h.ctx, ACTOR, post_id).await.unwrap();
        assert_eq!(view.post.timestamp, NOW + DRAFT_PSEUDO_OFFSET_SECS);
        assert_eq!(view.post.status, PostStatus::Draft);
        assert_eq!(fetch_drafts(&h.ctx, ACTOR).await.unwrap().len(), 1);

        convert_draft(
            &h.ctx,
            ACTOR,
            post_id,
            &payload(NOW + 125, &["draft one", "and two"], vec![]),
        )
        .await
        .unwrap();

        let tables = h.store.tables();
        assert!(tables.drafts.is_empty());
        assert_eq!(tables.schedules[&post_id].timestamp, (NOW + 125) / 60 * 60);
        assert_eq!(tables.schedules[&post_id].status, PostStatus::Scheduled);
        assert_eq!(tables.thread.len(), 2);
        assert!(matches!(
            fetch_draft(&h.ctx, ACTOR, post_id).await,
            Err(ServiceError::DraftNotFound)
        ));
    }

    #[tokio::test]
    async fn create_draft_requires_connected_account() {
        let h = harness_with(MemoryStore::default());
        let content = payload(0, &["a"], vec![]).content;
        assert!(matches!(
            create_draft(&h.ctx, ACTOR, &content).await,
            Err(ServiceError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn converting_a_scheduled_post_fails_cleanly() {
        let h = connected();
        let post_id = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![]))
            .await
            .unwrap();
        let err = convert_draft(&h.ctx, ACTOR, post_id, &payload(NOW + 600, &["b"], vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DraftNotFound));
        assert_eq!(h.store.tables().thread.values().next().unwrap(), "a");
    }

    #[tokio::test]
    async fn delete_is_owner_scoped_and_idempotent() {
        let h = connected();
        let post_id = create_post(&h.ctx, ACTOR, &payload(NOW + 600, &["a"], vec![new_png(1, 1)]))
            .await
            .unwrap();
        let key = media_keys(&h, post_id).remove(0);

        let stranger = Actor {
            user_id: 99,
            account_id: ACTOR.account_id,
        };
        delete_post(&h.ctx, stranger, post_id).await.unwrap();
        assert_eq!(h.store.tables().posts.len(), 1);
        assert!(h.objects.contains(&key));

        delete_post(&h.ctx, ACTOR, post_id).await.unwrap();
        delete_post(&h.ctx, ACTOR, post_id).await.unwrap();
        let tables = h.store.tables();
        assert!(tables.posts.is_empty());
        assert!(tables.schedules.is_empty());
        assert!(tables.thread.is_empty());
        assert!(!h.objects.contains(&key));
    }

    #[tokio::test]
    async fn fetch_post_nests_media_and_hides_other_accounts() {
        let h = connected();
        let post_id = create_post(
            &h.ctx,
            ACTOR,
            &payload(NOW + 600, &["a", "b"], vec![new_png(2, 1)]),
        )
        .await
        .unwrap();

        let view = fetch_post(&h.ctx, ACTOR, post_id).await.unwrap();
        assert_eq!(view.tweets.len(), 2);
        assert!(view.tweets[0].media.is_empty());
        assert_eq!(view.tweets[1].media.len(), 1);

        let other = Actor {
            user_id: ACTOR.user_id,
            account_id: 777,
        };
        assert!(matches!(
            fetch_post(&h.ctx, other, post_id).await,
            Err(ServiceError::PostNotFound)
        ));
    }
}
