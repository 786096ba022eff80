//! Application constants

/// Object store prefix for every media key issued by the pipeline
pub const MEDIA_KEY_PREFIX: &str = "twitter_images/";

/// Post descriptions are derived from the first tweet, capped at this many chars
pub const DESCRIPTION_MAX_CHARS: usize = 100;

/// Maximum characters in a single tweet
pub const TWEET_MAX_CHARS: usize = 280;

/// Maximum characters in a category name
pub const CATEGORY_NAME_MAX_CHARS: usize = 20;

pub const PLUG_NAME_MAX_CHARS: usize = 50;

/// Schedule granularity in seconds (one minute)
pub const SCHEDULE_GRANULARITY_SECS: i64 = 60;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Number of day buckets in the queue view
pub const QUEUE_WINDOW_DAYS: i64 = 7;

/// Drafts have no timestamp; readers get "now + this" as a placeholder
pub const DRAFT_PSEUDO_OFFSET_SECS: i64 = 600;

/// post_type value for twitter threads
pub const TWITTER_POST_TYPE: i16 = 1;

/// Maximum request body size (base64 media arrives inline)
pub const MAX_UPLOAD_SIZE: usize = 25 * 1024 * 1024;
