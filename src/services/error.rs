//! Error type shared by the core operations

use crate::services::twitter::TwitterError;
use crate::storage::StorageError;

/// Transport-free classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Malformed input, rejected before any write
    Validation,
    /// Unsupported media format
    FileType,
    /// The operation cannot run in the current state (account not connected, empty thread)
    Precondition,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("Only JPG or PNG file is allowed")]
    FileType,
    #[error("Please connect your twitter account in settings")]
    NotConnected,
    #[error("No tweets found")]
    NoTweets,
    #[error("Post not found")]
    PostNotFound,
    #[error("Draft not found")]
    DraftNotFound,
    #[error("Post is not awaiting dispatch")]
    NotDispatchable,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("An account already exists with the given email")]
    AlreadyExists,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("publish error: {0}")]
    Publish(#[from] TwitterError),
    /// The chain broke after some units were already live
    #[error("published {count} units before failing: {source}", count = .published.len())]
    PartiallyPublished {
        published: Vec<String>,
        source: Box<ServiceError>,
    },
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ServiceError::Validation(_) => FailureKind::Validation,
            ServiceError::FileType => FailureKind::FileType,
            ServiceError::NotConnected | ServiceError::NoTweets | ServiceError::NotDispatchable => {
                FailureKind::Precondition
            }
            ServiceError::PostNotFound | ServiceError::DraftNotFound | ServiceError::NotFound(_) => {
                FailureKind::NotFound
            }
            ServiceError::AlreadyExists => FailureKind::Conflict,
            ServiceError::InvalidCredentials => FailureKind::Validation,
            ServiceError::Database(_)
            | ServiceError::Storage(_)
            | ServiceError::Publish(_)
            | ServiceError::Internal(_) => FailureKind::Internal,
            ServiceError::PartiallyPublished { source, .. } => source.kind(),
        }
    }
}
