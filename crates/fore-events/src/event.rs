use chrono::{DateTime, Utc};
use fore_core::{Post, PostId, PostStatus};
use serde::{Deserialize, Serialize};

/// A message pushed to connected clients.
///
/// Wire form is `{"type": "<variant>", "data": <payload>}`; payload-less
/// variants omit `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    /// First message of every subscription.
    Connected,
    /// Keep-alive so clients can detect a dead connection.
    Heartbeat,
    /// A post changed state.
    PostUpdate(PostView),
}

impl Event {
    pub fn post_update(post: &Post) -> Self {
        Event::PostUpdate(PostView::from(post))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected => "connected",
            Event::Heartbeat => "heartbeat",
            Event::PostUpdate(_) => "post_update",
        }
    }

    /// JSON body for one `data:` line of a text/event-stream.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"type":"{}"}}"#, self.kind()))
    }
}

/// The public fields of a post, as seen by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub id: PostId,
    pub content: String,
    pub platform: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub attempt_count: u32,
}

impl From<&Post> for PostView {
    fn from(p: &Post) -> Self {
        Self {
            id: p.id.clone(),
            content: p.content.clone(),
            platform: p.platform.clone(),
            scheduled_time: p.scheduled_time,
            status: p.status,
            media: p.media.clone(),
            external_id: p.external_id.clone(),
            last_error: p.last_error.clone(),
            attempt_count: p.attempt_count,
        }
    }
}
