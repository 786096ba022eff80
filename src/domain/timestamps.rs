//! Timestamp normalization: minute flooring and timezone day buckets.
//!
//! Everything here is integer math over unix seconds and an offset in minutes
//! east of UTC (the value stored with each profile's timezone).

use crate::constants::{QUEUE_WINDOW_DAYS, SCHEDULE_GRANULARITY_SECS, SECONDS_PER_DAY};

/// Floor a unix timestamp to the start of its minute.
pub fn schedule_timestamp(raw: i64) -> i64 {
    raw.div_euclid(SCHEDULE_GRANULARITY_SECS) * SCHEDULE_GRANULARITY_SECS
}

/// Start of the local calendar day containing `timestamp`, as a unix timestamp.
///
/// The day is computed in the account's local time (`timestamp + offset`) and
/// shifted back by the offset, so every instant of one local day maps to the
/// same key. With a zero offset this is the start of the UTC day.
///
/// Flooring to the UTC day and then shifting by the offset would split one
/// local day across two keys whenever the offset is non-zero; this does not.
pub fn day_bucket(offset_minutes: i32, timestamp: i64) -> i64 {
    let shift = i64::from(offset_minutes) * 60;
    (timestamp + shift).div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY - shift
}

/// Inclusive `[start, end]` bounds of the seven day queue window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWindow {
    pub start: i64,
    pub end: i64,
}

impl QueueWindow {
    /// The window opens on the bucket of `now`, or on the day after `anchor`
    /// when the caller is paging forward.
    pub fn new(offset_minutes: i32, now: i64, anchor: Option<i64>) -> Self {
        let start = match anchor {
            Some(anchor) => day_bucket(offset_minutes, anchor + SECONDS_PER_DAY),
            None => day_bucket(offset_minutes, now),
        };
        Self {
            start,
            end: start + QUEUE_WINDOW_DAYS * SECONDS_PER_DAY - SCHEDULE_GRANULARITY_SECS,
        }
    }

    /// Bucket keys, one per day, in ascending order
    pub fn buckets(&self) -> impl Iterator<Item = i64> {
        let start = self.start;
        (0..QUEUE_WINDOW_DAYS).map(move |day| start + day * SECONDS_PER_DAY)
    }
}
