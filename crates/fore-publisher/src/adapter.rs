use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// An uploaded file handed to an adapter as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// What a platform returned for a successful publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    /// The platform's id for the created post.
    pub external_id: String,
    /// Non-fatal problem, e.g. the media was dropped and the text went out alone.
    pub warning: Option<String>,
    /// Full platform response, forwarded to notifications.
    pub raw: Value,
}

impl PublishReceipt {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            warning: None,
            raw: Value::Null,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = raw;
        self
    }
}

/// Errors an adapter can report. All of them end the attempt as `failed`.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The platform answered and refused the post.
    #[error("Rejected by platform ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The platform could not be reached.
    #[error("Network error: {0}")]
    Transport(String),

    /// The platform answered with something that carries no post id.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        AdapterError::Transport(e.to_string())
    }
}

/// Common interface of every external publishing platform.
///
/// Adapters are stored in an [`AdapterRegistry`](crate::registry::AdapterRegistry)
/// keyed by [`name`](PlatformAdapter::name) and called concurrently from
/// publish tasks, hence `&self`.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Platform name matched against `Post::platform` (e.g. `"x"`).
    fn name(&self) -> &str;

    /// Publish one post and return the platform's id for it.
    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<PublishReceipt, AdapterError>;
}
