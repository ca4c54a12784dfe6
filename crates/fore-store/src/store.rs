use chrono::{DateTime, Duration, Utc};
use fore_core::{NewPost, Post, PostId, PostStatus};

use crate::error::Result;

/// Storage contract the engine depends on.
///
/// Implementations must make [`try_claim`](PostStore::try_claim) and guarded
/// [`update`](PostStore::update) calls atomic with respect to every other
/// caller, including other processes sharing the same backing store.
pub trait PostStore: Send + Sync {
    /// Posts with `status = scheduled` and `scheduled_time <= now + window`,
    /// oldest first.
    fn find_due(&self, now: DateTime<Utc>, window: Duration) -> Result<Vec<Post>>;

    /// Conditionally move `id` from `expected` to `posting`.
    ///
    /// Returns `false` when another caller got there first (or the post is in
    /// any other state). Never an error for a lost race.
    fn try_claim(&self, id: &PostId, expected: PostStatus) -> Result<bool>;

    /// Apply `patch` to `id`.
    fn update(&self, id: &PostId, patch: &PostPatch) -> Result<()>;

    fn get(&self, id: &PostId) -> Result<Option<Post>>;

    fn insert(&self, new: NewPost) -> Result<Post>;

    /// All posts ordered by scheduled time.
    fn list(&self) -> Result<Vec<Post>>;

    /// Scheduled times of posts still waiting or in flight, at or after `since`.
    /// Feeds the time-slot allocator.
    fn scheduled_times(&self, since: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>>;

    /// Posts stuck in `posting` whose claim was taken before `claimed_before`.
    fn find_stale_claims(&self, claimed_before: DateTime<Utc>) -> Result<Vec<Post>>;
}

/// A partial update. `None` leaves a column untouched; for nullable columns
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostPatch {
    pub status: Option<PostStatus>,
    pub external_id: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
    /// Increment `attempt_count` in place.
    pub bump_attempt: bool,
    /// When set, the update only applies if the row is currently in this state.
    pub expect_status: Option<PostStatus>,
}

impl PostPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that another attempt is starting. Only valid while claimed.
    pub fn attempt() -> Self {
        Self {
            bump_attempt: true,
            expect_status: Some(PostStatus::Posting),
            ..Self::default()
        }
    }

    /// Terminal success: set the platform id and clear any previous error.
    pub fn posted(external_id: impl Into<String>) -> Self {
        Self {
            status: Some(PostStatus::Posted),
            external_id: Some(Some(external_id.into())),
            last_error: Some(None),
            expect_status: Some(PostStatus::Posting),
            ..Self::default()
        }
    }

    /// Terminal failure. `external_id` is left unset.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(PostStatus::Failed),
            last_error: Some(Some(message.into())),
            expect_status: Some(PostStatus::Posting),
            ..Self::default()
        }
    }

    pub fn expect_status(mut self, status: PostStatus) -> Self {
        self.expect_status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.external_id.is_none()
            && self.last_error.is_none()
            && !self.bump_attempt
    }
}
