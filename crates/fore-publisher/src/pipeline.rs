use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fore_core::config::{ForeConfig, DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_NOTIFY_TIMEOUT_SECS};
use fore_core::{Post, PostId, PostStatus};
use fore_events::{Event, EventBroadcaster};
use fore_store::{PostPatch, PostStore, StoreError};
use futures_util::FutureExt;
use tracing::{error, info, warn};

use crate::adapter::{AdapterError, MediaAttachment, PublishReceipt};
use crate::error::{PublishError, Result};
use crate::notifier::{Notification, Notifier, NotifyKind};
use crate::registry::AdapterRegistry;

/// Drives one claimed post through the platform adapter to a terminal state.
///
/// Every run follows the same order:
///
/// 1. bump `attempt_count` in the store, broadcast `posting`
/// 2. call the adapter under the adapter timeout
/// 3. persist `posted`/`failed` (guarded on `posting`)
/// 4. broadcast the terminal state, then notify
///
/// The post is never broadcast in a state that has not been committed.
pub struct PublishPipeline {
    store: Arc<dyn PostStore>,
    adapters: Arc<AdapterRegistry>,
    notifier: Arc<dyn Notifier>,
    events: EventBroadcaster,
    upload_dir: PathBuf,
    adapter_timeout: Duration,
    notify_timeout: Duration,
}

impl PublishPipeline {
    pub fn new(
        store: Arc<dyn PostStore>,
        adapters: Arc<AdapterRegistry>,
        notifier: Arc<dyn Notifier>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            store,
            adapters,
            notifier,
            events,
            upload_dir: PathBuf::from("."),
            adapter_timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
        }
    }

    /// Apply the `[scheduler]` timeouts and `[media]` upload directory.
    pub fn configured(self, cfg: &ForeConfig) -> Self {
        self.with_upload_dir(&cfg.media.upload_dir)
            .with_adapter_timeout(Duration::from_secs(cfg.scheduler.adapter_timeout_secs))
            .with_notify_timeout(Duration::from_secs(cfg.scheduler.notify_timeout_secs))
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.store
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Publish a post the caller has already claimed (`status = posting`).
    ///
    /// Adapter failures are recorded on the post as `failed` and also
    /// returned, so callers can log them. A `Store` error means the outcome
    /// could not be recorded.
    pub async fn publish(&self, post: Post) -> Result<PublishReceipt> {
        match self.store.update(&post.id, &PostPatch::attempt()) {
            Ok(()) => {}
            Err(StoreError::StateConflict { .. }) => {
                warn!(post_id = %post.id, "post is not claimed, refusing to publish");
                return Err(PublishError::ClaimConflict(post.id));
            }
            Err(e) => return Err(self.store_failed(&post, e).await),
        }
        // reload so the broadcast carries the stored attempt count, not the caller's snapshot
        let mut post = match self.store.get(&post.id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                let e = StoreError::PostNotFound { id: post.id.clone() };
                return Err(self.store_failed(&post, e).await);
            }
            Err(e) => return Err(self.store_failed(&post, e).await),
        };
        let attempt = post.attempt_count;
        self.events.publish(Event::post_update(&post));

        info!(post_id = %post.id, platform = %post.platform, attempt, "publishing post");

        match self.call_adapter(&post).await {
            Ok(receipt) => {
                if let Err(e) = self
                    .store
                    .update(&post.id, &PostPatch::posted(receipt.external_id.clone()))
                {
                    return Err(self.store_failed(&post, e).await);
                }
                post.status = PostStatus::Posted;
                post.external_id = Some(receipt.external_id.clone());
                post.last_error = None;
                self.events.publish(Event::post_update(&post));

                info!(post_id = %post.id, external_id = %receipt.external_id, "post published");
                if let Some(w) = &receipt.warning {
                    warn!(post_id = %post.id, warning = %w, "post published with warning");
                }
                self.notify(Notification::new(NotifyKind::Success, &post, success_details(&receipt)))
                    .await;
                Ok(receipt)
            }
            Err(failure) => {
                let message = failure.to_string();
                if let Err(e) = self.store.update(&post.id, &PostPatch::failed(message.clone())) {
                    return Err(self.store_failed(&post, e).await);
                }
                post.status = PostStatus::Failed;
                post.last_error = Some(message.clone());
                self.events.publish(Event::post_update(&post));

                warn!(post_id = %post.id, error = %message, "post failed");
                self.notify(Notification::new(NotifyKind::Failure, &post, message)).await;
                Err(failure)
            }
        }
    }

    /// Claim a `draft` or `scheduled` post and publish it right away.
    ///
    /// The work runs on its own task: dropping the returned future (a client
    /// hanging up, say) does not stop the post from reaching `posted` or
    /// `failed`.
    pub async fn publish_now(self: &Arc<Self>, id: &PostId) -> Result<PublishReceipt> {
        let pipeline = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move { pipeline.claim_and_publish(&id).await })
            .await
            .map_err(|e| {
                error!(error = %e, "publish-now task failed");
                PublishError::Aborted(e.to_string())
            })?
    }

    async fn claim_and_publish(&self, id: &PostId) -> Result<PublishReceipt> {
        let post = self
            .store
            .get(id)?
            .ok_or_else(|| PublishError::NotFound(id.clone()))?;

        if !matches!(post.status, PostStatus::Draft | PostStatus::Scheduled) {
            return Err(PublishError::InvalidState {
                id: id.clone(),
                status: post.status,
            });
        }
        if !self.store.try_claim(id, post.status)? {
            return Err(PublishError::ClaimConflict(id.clone()));
        }

        info!(post_id = %id, from = %post.status, "post claimed for immediate publish");
        let claimed = self
            .store
            .get(id)?
            .ok_or_else(|| PublishError::NotFound(id.clone()))?;
        self.publish(claimed).await
    }

    async fn call_adapter(&self, post: &Post) -> Result<PublishReceipt> {
        let adapter = self
            .adapters
            .get(&post.platform)
            .ok_or_else(|| PublishError::UnsupportedPlatform(post.platform.clone()))?;

        let media = match &post.media {
            Some(name) => load_media(&self.upload_dir, name, &post.id).await,
            None => None,
        };

        let call = AssertUnwindSafe(adapter.publish(&post.content, media.as_ref())).catch_unwind();
        match tokio::time::timeout(self.adapter_timeout, call).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                error!(post_id = %post.id, adapter = adapter.name(), reason = %reason, "adapter panicked");
                Err(AdapterError::UnexpectedResponse(format!("adapter panicked: {reason}")).into())
            }
            Err(_) => Err(PublishError::Timeout {
                ms: self.adapter_timeout.as_millis() as u64,
            }),
        }
    }

    async fn store_failed(&self, post: &Post, e: StoreError) -> PublishError {
        error!(post_id = %post.id, error = %e, "failed to record publish progress");
        self.notify(Notification::new(
            NotifyKind::Error,
            post,
            format!("Error processing post {}: {}", post.id, e),
        ))
        .await;
        PublishError::Store(e)
    }

    async fn notify(&self, n: Notification) {
        match tokio::time::timeout(self.notify_timeout, self.notifier.send(&n)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                post_id = %n.post_id,
                notifier = self.notifier.name(),
                kind = n.kind.as_str(),
                error = %e,
                "notification failed"
            ),
            Err(_) => warn!(
                post_id = %n.post_id,
                notifier = self.notifier.name(),
                kind = n.kind.as_str(),
                "notification timed out"
            ),
        }
    }
}

/// Read `name` from the upload directory. A missing or unreadable file is
/// logged and the post goes out text-only.
async fn load_media(upload_dir: &Path, name: &str, post_id: &PostId) -> Option<MediaAttachment> {
    // Only the final path component is honoured; media never escapes the upload dir.
    let filename = Path::new(name).file_name()?.to_string_lossy().into_owned();
    let path = upload_dir.join(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some(MediaAttachment { filename, bytes }),
        Err(e) => {
            warn!(post_id = %post_id, path = %path.display(), error = %e, "media unavailable, publishing text only");
            None
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn success_details(receipt: &PublishReceipt) -> String {
    let mut details = format!("Platform ID: {}", receipt.external_id);
    if let Some(w) = &receipt.warning {
        details.push_str(&format!("\nWarning: {w}"));
    }
    if !receipt.raw.is_null() {
        details.push_str(&format!("\nResponse: {}", receipt.raw));
    }
    details
}
