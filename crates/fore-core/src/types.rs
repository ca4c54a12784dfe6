use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a post (UUIDv7, time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub String);

impl PostId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for PostId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for PostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a post.
///
/// The engine only ever moves `scheduled → posting` (claim) and
/// `posting → posted | failed` (terminal). Everything else is a CRUD edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Scheduled,
    /// Transient claim held by exactly one pipeline run.
    Posting,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Posting => "posting",
            PostStatus::Posted => "posted",
            PostStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted | PostStatus::Failed)
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "scheduled" => Ok(PostStatus::Scheduled),
            "posting" => Ok(PostStatus::Posting),
            "posted" => Ok(PostStatus::Posted),
            "failed" => Ok(PostStatus::Failed),
            other => Err(format!("unknown post status: {other}")),
        }
    }
}

/// A persisted post record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    /// Opaque reference to an uploaded asset (filename under the upload dir).
    pub media: Option<String>,
    /// Target platform name, used to pick the adapter (e.g. `"x"`).
    pub platform: String,
    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    /// Platform-assigned id, set only after a successful publish.
    pub external_id: Option<String>,
    /// Last failure message, cleared again on a later success.
    pub last_error: Option<String>,
    /// Publish attempts made. Never decreases.
    pub attempt_count: u32,
    /// When the current (or most recent) `posting` claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the CRUD layer when a post is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub content: String,
    #[serde(default)]
    pub media: Option<String>,
    pub platform: String,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default = "default_new_status")]
    pub status: PostStatus,
}

fn default_new_status() -> PostStatus {
    PostStatus::Scheduled
}

impl NewPost {
    pub fn scheduled(
        content: impl Into<String>,
        platform: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            content: content.into(),
            media: None,
            platform: platform.into(),
            scheduled_time: at,
            status: PostStatus::Scheduled,
        }
    }

    pub fn with_media(mut self, media: impl Into<String>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }
}

/// A preferred daily posting time, e.g. `09:00`.
///
/// Serialised as an `"HH:MM"` string so config files stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl TimeOfDay {
    /// Returns `None` for out-of-range values.
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected HH:MM, got {s:?}"))?;
        let hour: u8 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u8 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        TimeOfDay::new(hour, minute).ok_or_else(|| format!("time out of range: {s:?}"))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
