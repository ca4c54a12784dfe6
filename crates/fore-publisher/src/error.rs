use fore_core::{PostId, PostStatus};
use fore_store::StoreError;
use thiserror::Error;

use crate::adapter::AdapterError;

/// Why a publish did not produce a `posted` post.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No adapter is registered for the post's platform.
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("Platform did not answer within {ms}ms")]
    Timeout { ms: u64 },

    /// The store failed while recording progress. The post may be left in `posting`.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Post not found: {0}")]
    NotFound(PostId),

    /// `publish_now` on a post that is already in flight or finished.
    #[error("Post {id} is {status} and cannot be published")]
    InvalidState { id: PostId, status: PostStatus },

    /// Another caller claimed the post first.
    #[error("Post {0} was claimed by another publisher")]
    ClaimConflict(PostId),

    /// The detached publish task did not run to completion.
    #[error("Publish task ended abnormally: {0}")]
    Aborted(String),
}

impl PublishError {
    /// Short error code string returned to HTTP clients and used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::UnsupportedPlatform(_) => "UNSUPPORTED_PLATFORM",
            PublishError::Adapter(_) => "ADAPTER_ERROR",
            PublishError::Timeout { .. } => "ADAPTER_TIMEOUT",
            PublishError::Store(_) => "STORE_UNAVAILABLE",
            PublishError::NotFound(_) => "NOT_FOUND",
            PublishError::InvalidState { .. } => "INVALID_STATE",
            PublishError::ClaimConflict(_) => "CLAIM_CONFLICT",
            PublishError::Aborted(_) => "PUBLISH_ABORTED",
        }
    }

    /// True when the error was recorded on the post as `failed`.
    pub fn marks_failed(&self) -> bool {
        matches!(
            self,
            PublishError::UnsupportedPlatform(_) | PublishError::Adapter(_) | PublishError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;
