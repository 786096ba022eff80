//! Dispatch state machine.
//!
//! `SCHEDULED -> DISPATCHING -> PUBLISHED | FAILED`. The thread is published
//! strictly in order, each unit replying to the id returned for the previous
//! one.

use bytes::Bytes;

use crate::domain::accounts::Credentials;
use crate::domain::media::prepare_media;
use crate::domain::posts::models::{PostStatus, StoredMedia, ThreadContent, ThreadUnit};
use crate::services::error::{FailureKind, ServiceError};
use crate::services::{Actor, PostContext};

enum MediaSource {
    /// Already in the object store
    Stored(String),
    /// Decoded from the request
    Inline(Bytes),
}

struct OutboundMedia {
    media_order: i32,
    source: MediaSource,
}

/// One tweet ready to publish
struct OutboundUnit {
    text: String,
    media: Vec<OutboundMedia>,
}

/// Publish a scheduled post and record the outcome on its schedule.
///
/// Only a SCHEDULED post of `account_id` is claimed; anything else is
/// `NotDispatchable` and the publisher is never called. A missing connection
/// or an empty thread is reported without marking the post FAILED; it stays
/// DISPATCHING until an operator resets it. Returns the external ids of the
/// published units, in thread order.
pub async fn dispatch(ctx: &PostContext, account_id: i64, post_id: i64) -> Result<Vec<String>, ServiceError> {
    if !ctx.store.claim_for_dispatch(post_id, account_id).await? {
        tracing::warn!(post_id, account_id, "Post is not awaiting dispatch");
        return Err(ServiceError::NotDispatchable);
    }

    match publish_post(ctx, account_id, post_id).await {
        Ok(ids) => {
            ctx.store.finish_dispatch(post_id, PostStatus::Published).await?;
            tracing::info!(post_id, account_id, units = ids.len(), "Published post");
            Ok(ids)
        }
        Err(e) if e.kind() == FailureKind::Precondition => {
            tracing::warn!(post_id, account_id, error = %e, "Dispatch precondition failed");
            Err(e)
        }
        Err(e) => {
            match &e {
                ServiceError::PartiallyPublished { published, source } => {
                    tracing::error!(post_id, account_id, ?published, error = %source, "Dispatch failed mid-thread")
                }
                _ => tracing::error!(post_id, account_id, error = %e, "Dispatch failed"),
            }
            if let Err(status_err) = ctx.store.finish_dispatch(post_id, PostStatus::Failed).await {
                tracing::error!(post_id, error = %status_err, "Failed to mark post as failed");
            }
            Err(e)
        }
    }
}

/// Publish a caller-supplied thread right away. Nothing is stored and no
/// status is written.
pub async fn dispatch_now(
    ctx: &PostContext,
    actor: Actor,
    content: &ThreadContent,
) -> Result<Vec<String>, ServiceError> {
    content.validate()?;
    let credentials = ctx
        .store
        .credentials(actor.account_id)
        .await?
        .ok_or(ServiceError::NotConnected)?;

    let mut units: Vec<OutboundUnit> = content
        .ordered_tweets()
        .into_iter()
        .map(|t| OutboundUnit {
            text: t.tweet,
            media: Vec::new(),
        })
        .collect();

    let orders: Vec<i32> = content.ordered_tweets().iter().map(|t| t.tweet_order).collect();
    for item in content.all_media() {
        let prepared = prepare_media(&item, &ctx.media_prefix)?;
        let source = match prepared.upload {
            Some(data) => MediaSource::Inline(data),
            None => MediaSource::Stored(prepared.record.key),
        };
        // validate() guarantees the order exists
        if let Some(index) = orders.iter().position(|o| *o == item.tweet_order) {
            units[index].media.push(OutboundMedia {
                media_order: item.media_order,
                source,
            });
        }
    }

    let ids = publish_chain(ctx, &credentials, units).await?;
    tracing::info!(account_id = actor.account_id, units = ids.len(), "Published thread immediately");
    Ok(ids)
}

async fn publish_post(ctx: &PostContext, account_id: i64, post_id: i64) -> Result<Vec<String>, ServiceError> {
    let credentials = ctx
        .store
        .credentials(account_id)
        .await?
        .ok_or(ServiceError::NotConnected)?;

    let thread = ctx.store.fetch_thread(post_id).await?;
    if thread.is_empty() {
        return Err(ServiceError::NoTweets);
    }
    let plug = ctx.store.fetch_plug_content(post_id).await?;
    let media = ctx.store.fetch_media(post_id).await?;

    publish_chain(ctx, &credentials, outbound_units(thread, plug, media)).await
}

/// Thread rows in order with their stored media, plus the plug as a final unit
fn outbound_units(thread: Vec<ThreadUnit>, plug: Option<String>, media: Vec<StoredMedia>) -> Vec<OutboundUnit> {
    let mut thread = thread;
    thread.sort_by_key(|unit| unit.tweet_order);

    let mut units: Vec<OutboundUnit> = thread
        .into_iter()
        .map(|unit| OutboundUnit {
            media: media
                .iter()
                .filter(|m| m.tweet_order == unit.tweet_order)
                .map(|m| OutboundMedia {
                    media_order: m.media_order,
                    source: MediaSource::Stored(m.key.clone()),
                })
                .collect(),
            text: unit.tweet,
        })
        .collect();

    if let Some(plug) = plug {
        units.push(OutboundUnit {
            text: plug,
            media: Vec::new(),
        });
    }
    units
}

async fn publish_chain(
    ctx: &PostContext,
    credentials: &Credentials,
    units: Vec<OutboundUnit>,
) -> Result<Vec<String>, ServiceError> {
    let mut ids: Vec<String> = Vec::with_capacity(units.len());

    for unit in units {
        match publish_unit(ctx, credentials, unit, ids.last().cloned()).await {
            Ok(id) => ids.push(id),
            Err(e) if ids.is_empty() => return Err(e),
            Err(e) => {
                return Err(ServiceError::PartiallyPublished {
                    published: ids,
                    source: Box::new(e),
                });
            }
        }
    }

    Ok(ids)
}

async fn publish_unit(
    ctx: &PostContext,
    credentials: &Credentials,
    unit: OutboundUnit,
    reply_to: Option<String>,
) -> Result<String, ServiceError> {
    let media_ids = upload_unit_media(ctx, credentials, unit.media).await?;
    Ok(ctx
        .publisher
        .publish_unit(credentials, &unit.text, reply_to, media_ids)
        .await?)
}

/// Upload in media order so the returned ids are already sorted
async fn upload_unit_media(
    ctx: &PostContext,
    credentials: &Credentials,
    mut media: Vec<OutboundMedia>,
) -> Result<Vec<String>, ServiceError> {
    media.sort_by_key(|m| m.media_order);

    let mut ids = Vec::with_capacity(media.len());
    for item in media {
        let data = match item.source {
            MediaSource::Stored(key) => ctx.objects.get(&key).await?,
            MediaSource::Inline(data) => data,
        };
        ids.push(ctx.publisher.upload_media(credentials, data.to_vec()).await?);
    }
    Ok(ids)
}
