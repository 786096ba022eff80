//! Post, schedule, thread and media models

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef};
use sqlx::{Decode, Encode, Postgres, Type};

use crate::constants::{DESCRIPTION_MAX_CHARS, TWEET_MAX_CHARS};
use crate::domain::media::MediaInput;
use crate::services::error::ServiceError;

/// Lifecycle of a post. Persisted as a SMALLINT on the schedule row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Dispatching,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            PostStatus::Draft => 0,
            PostStatus::Scheduled => 1,
            PostStatus::Dispatching => 2,
            PostStatus::Published => 3,
            PostStatus::Failed => 4,
        }
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(PostStatus::Draft),
            1 => Some(PostStatus::Scheduled),
            2 => Some(PostStatus::Dispatching),
            3 => Some(PostStatus::Published),
            4 => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

impl Type<Postgres> for PostStatus {
    fn type_info() -> PgTypeInfo {
        <i16 as Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <i16 as Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for PostStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let raw = <i16 as Decode<Postgres>>::decode(value)?;
        PostStatus::from_i16(raw).ok_or_else(|| format!("unknown post status {}", raw).into())
    }
}

impl Encode<'_, Postgres> for PostStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        <i16 as Encode<Postgres>>::encode_by_ref(&self.as_i16(), buf)
    }
}

/// One tweet of a submitted thread
#[derive(Debug, Clone, Deserialize)]
pub struct TweetInput {
    pub tweet: String,
    pub tweet_order: i32,
    /// Media nested under the tweet; see [`flatten_media`]
    #[serde(default)]
    pub media: Vec<NestedMedia>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NestedMedia {
    pub newly_added: bool,
    pub url: String,
}

/// Body shared by posts and drafts
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadContent {
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub plug_id: Option<i64>,
    pub tweets: Vec<TweetInput>,
    #[serde(default)]
    pub media: Vec<MediaInput>,
}

/// A post submitted for scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct PostPayload {
    pub timestamp: i64,
    #[serde(default)]
    pub recurring: bool,
    #[serde(flatten)]
    pub content: ThreadContent,
}

impl ThreadContent {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.tweets.is_empty() {
            return Err(invalid("Tweets list is required"));
        }

        let mut orders = HashSet::new();
        for tweet in &self.tweets {
            let len = tweet.tweet.chars().count();
            if len == 0 {
                return Err(invalid("Tweet cannot be empty"));
            }
            if len > TWEET_MAX_CHARS {
                return Err(invalid("Tweet cannot exceed more than 280 characters"));
            }
            if !orders.insert(tweet.tweet_order) {
                return Err(invalid("Tweet order must be unique"));
            }
        }
        // orders are unique, so 1..=n is present iff every order is in range
        let count = order_count(self.tweets.len())?;
        if orders.iter().any(|order| *order < 1 || *order > count) {
            return Err(invalid("Tweet order must run from 1 without gaps"));
        }

        let mut slots = HashSet::new();
        for item in self.all_media() {
            if !orders.contains(&item.tweet_order) {
                return Err(invalid("Media must belong to an existing tweet"));
            }
            if !slots.insert((item.tweet_order, item.media_order)) {
                return Err(invalid("Media order must be unique within a tweet"));
            }
        }

        Ok(())
    }

    /// Derived from the first tweet: trimmed, at most 100 characters
    pub fn description(&self) -> String {
        self.tweets
            .iter()
            .min_by_key(|t| t.tweet_order)
            .map(|t| t.tweet.trim().chars().take(DESCRIPTION_MAX_CHARS).collect())
            .unwrap_or_default()
    }

    /// Tweets sorted by order
    pub fn ordered_tweets(&self) -> Vec<TweetInput> {
        let mut tweets = self.tweets.clone();
        tweets.sort_by_key(|t| t.tweet_order);
        tweets
    }

    /// Top-level media followed by media nested under tweets
    pub fn all_media(&self) -> Vec<MediaInput> {
        let mut media = self.media.clone();
        media.extend(flatten_media(&self.tweets));
        media
    }
}

impl PostPayload {
    pub fn validate(&self, now: i64) -> Result<(), ServiceError> {
        if self.timestamp <= now {
            return Err(invalid("Scheduled time must be ahead of current time"));
        }
        self.content.validate()
    }
}

/// Lift media nested under tweets into flat items, numbering them from 1
/// in submission order.
pub fn flatten_media(tweets: &[TweetInput]) -> Vec<MediaInput> {
    tweets
        .iter()
        .flat_map(|tweet| {
            tweet.media.iter().enumerate().map(|(i, media)| MediaInput {
                newly_added: media.newly_added,
                url: media.url.clone(),
                tweet_order: tweet.tweet_order,
                // saturates; the slot uniqueness check rejects the overflow
                media_order: i32::try_from(i + 1).unwrap_or(i32::MAX),
            })
        })
        .collect()
}

/// Tweet and media orders are INT columns
fn order_count(len: usize) -> Result<i32, ServiceError> {
    i32::try_from(len).map_err(|_| invalid("Too many tweets in thread"))
}

fn invalid(message: &str) -> ServiceError {
    ServiceError::Validation(message.to_string())
}

/// Columns written to the posts table
#[derive(Debug, Clone)]
pub struct NewPost {
    pub description: String,
    pub user_id: i64,
    pub account_id: i64,
    pub post_type: i16,
    pub category_id: Option<i64>,
    pub plug_id: Option<i64>,
}

/// A post joined with its schedule (or a draft with a placeholder timestamp)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PostRecord {
    pub id: i64,
    pub description: String,
    pub category_id: Option<i64>,
    pub plug_id: Option<i64>,
    pub timestamp: i64,
    pub status: PostStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ThreadUnit {
    pub tweet: String,
    pub tweet_order: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct StoredMedia {
    pub tweet_order: i32,
    pub media_order: i32,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DraftSummary {
    pub id: i64,
    pub description: String,
    pub category_id: Option<i64>,
    pub plug_id: Option<i64>,
}

/// A schedule row whose minute has come
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DuePost {
    pub post_id: i64,
    pub account_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaView {
    pub media_order: i32,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TweetView {
    pub tweet: String,
    pub tweet_order: i32,
    pub media: Vec<MediaView>,
}

/// A post with its ordered thread, media nested under each tweet
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: PostRecord,
    pub tweets: Vec<TweetView>,
}

impl PostView {
    pub fn assemble(post: PostRecord, thread: Vec<ThreadUnit>, media: Vec<StoredMedia>) -> Self {
        let tweets = thread
            .into_iter()
            .map(|unit| {
                let mut attached: Vec<MediaView> = media
                    .iter()
                    .filter(|m| m.tweet_order == unit.tweet_order)
                    .map(|m| MediaView {
                        media_order: m.media_order,
                        key: m.key.clone(),
                    })
                    .collect();
                attached.sort_by_key(|m| m.media_order);
                TweetView {
                    tweet: unit.tweet,
                    tweet_order: unit.tweet_order,
                    media: attached,
                }
            })
            .collect();
        Self { post, tweets }
    }
}
