use std::sync::Arc;

use crate::domain::posts::store::PostStore;
use crate::services::clock::Clock;
use crate::services::twitter::Publisher;
use crate::storage::ObjectStore;

pub mod clock;
pub mod cookies;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod posts;
pub mod queue;
pub mod session;
pub mod twitter;

/// Collaborators of the post core, built once at startup
#[derive(Clone)]
pub struct PostContext {
    pub store: Arc<dyn PostStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub publisher: Arc<dyn Publisher>,
    pub clock: Arc<dyn Clock>,
    /// Object store prefix for media keys
    pub media_prefix: String,
}

/// The user acting on behalf of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
    pub account_id: i64,
}
