use fore_core::{PostId, PostStatus};
use thiserror::Error;

/// Errors that can occur within the post store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error. Treated as "store unavailable".
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking holder.
    #[error("Store connection poisoned")]
    Poisoned,

    #[error("Post not found: {id}")]
    PostNotFound { id: PostId },

    /// A guarded update found the post in an unexpected state.
    #[error("Post {id} is not in state {expected}")]
    StateConflict { id: PostId, expected: PostStatus },
}

pub type Result<T> = std::result::Result<T, StoreError>;
