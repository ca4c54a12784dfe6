//! Shared building blocks for the Fore publishing engine: the post model,
//! configuration loading, and the top-level error type.

pub mod config;
pub mod error;
pub mod types;

pub use config::ForeConfig;
pub use error::{ForeError, Result};
pub use types::{NewPost, Post, PostId, PostStatus, TimeOfDay};
