//! Seven-day queue of scheduled posts, grouped by the user's local day

use std::collections::BTreeMap;

use crate::domain::posts::models::PostRecord;
use crate::domain::timestamps::{QueueWindow, day_bucket};
use crate::services::error::ServiceError;
use crate::services::{Actor, PostContext};

/// Day key (midnight in the user's timezone, as epoch seconds) to the posts due that day.
/// All seven keys are present even when a day is empty.
pub type Queue = BTreeMap<i64, Vec<PostRecord>>;

/// With `anchor` set, the window starts the day after the anchor's day
pub async fn fetch_queue(
    ctx: &PostContext,
    actor: Actor,
    anchor: Option<i64>,
) -> Result<Queue, ServiceError> {
    let offset = ctx.store.offset_minutes(actor.user_id).await?;
    let window = QueueWindow::new(offset, ctx.clock.now(), anchor);

    let posts = ctx
        .store
        .scheduled_between(actor.account_id, window.start, window.end)
        .await?;

    let mut queue: Queue = window.buckets().map(|day| (day, Vec::new())).collect();
    for post in posts {
        let day = day_bucket(offset, post.timestamp);
        match queue.get_mut(&day) {
            Some(bucket) => bucket.push(post),
            None => {
                tracing::warn!(
                    post_id = post.id,
                    timestamp = post.timestamp,
                    day,
                    "Scheduled post fell outside the queue window"
                );
            }
        }
    }

    Ok(queue)
}
