//! Background dispatch worker using apalis
//!
//! Runs as a cron job: each tick publishes the posts scheduled for that minute.

use std::str::FromStr;

use apalis::prelude::*;
use apalis_cron::{CronStream, Schedule};
use apalis_sql::postgres::PostgresStorage;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::domain::timestamps::schedule_timestamp;
use crate::services::PostContext;
use crate::services::dispatch::dispatch;
use crate::services::error::ServiceError;

/// Job input: the tick that fired
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchJob {
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

impl From<chrono::DateTime<chrono::Utc>> for DispatchJob {
    fn from(dt: chrono::DateTime<chrono::Utc>) -> Self {
        DispatchJob { scheduled_at: dt }
    }
}

#[derive(Clone)]
pub struct DispatchContext {
    pub core: PostContext,
    pub batch_size: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("failed to set up job storage: {0}")]
    Setup(#[from] sqlx::Error),
    #[error("invalid dispatch schedule {0:?}: {1}")]
    Schedule(String, String),
    #[error("dispatch worker stopped: {0}")]
    Monitor(String),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub published: usize,
    pub failed: usize,
}

/// Job handler. Always returns Ok: a post's failure is recorded on the post,
/// and a failed lookup is retried on the next tick.
async fn dispatch_job(job: DispatchJob, ctx: Data<DispatchContext>) -> Result<(), Error> {
    match dispatch_due(&ctx.core, job.scheduled_at.timestamp(), ctx.batch_size).await {
        Ok(summary) => {
            if summary.published > 0 || summary.failed > 0 {
                tracing::info!(
                    published = summary.published,
                    failed = summary.failed,
                    "Dispatch tick complete"
                );
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to load due posts"),
    }
    Ok(())
}

/// Start the dispatch worker. Returns only if the monitor stops.
pub async fn run_dispatch_worker(pool: PgPool, ctx: DispatchContext, cron: &str) -> Result<(), DispatcherError> {
    // apalis bookkeeping tables
    PostgresStorage::setup(&pool).await?;

    let storage: PostgresStorage<DispatchJob> = PostgresStorage::new(pool);
    let schedule =
        Schedule::from_str(cron).map_err(|e| DispatcherError::Schedule(cron.to_string(), e.to_string()))?;
    let backend = CronStream::new(schedule).pipe_to_storage(storage);

    tracing::info!(cron, batch_size = ctx.batch_size, "Dispatch worker starting");

    let worker = WorkerBuilder::new("dispatch-worker")
        .data(ctx)
        .backend(backend)
        .build_fn(dispatch_job);

    Monitor::new()
        .register(worker)
        .run()
        .await
        .map_err(|e| DispatcherError::Monitor(e.to_string()))
}

/// Dispatch every post scheduled for the minute containing `now`, `batch_size`
/// at a time. Posts within a batch run concurrently.
pub async fn dispatch_due(ctx: &PostContext, now: i64, batch_size: usize) -> Result<TickSummary, ServiceError> {
    let minute = schedule_timestamp(now);
    let due = ctx.store.due_posts(minute).await?;

    let mut summary = TickSummary::default();
    for batch in due.chunks(batch_size.max(1)) {
        let results = join_all(
            batch
                .iter()
                .map(|post| dispatch(ctx, post.account_id, post.post_id)),
        )
        .await;

        for result in results {
            match result {
                Ok(_) => summary.published += 1,
                Err(_) => summary.failed += 1,
            }
        }
    }

    Ok(summary)
}
