use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::adapter::{AdapterError, MediaAttachment, PlatformAdapter, PublishReceipt};

/// Publishes nowhere. Returns a synthetic id so the full lifecycle can be
/// exercised without platform credentials.
pub struct DryRunAdapter {
    name: String,
}

impl DryRunAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl PlatformAdapter for DryRunAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<PublishReceipt, AdapterError> {
        let id = format!("dry-run-{}", Uuid::now_v7());
        info!(
            platform = %self.name,
            chars = content.chars().count(),
            media = media.map(|m| m.filename.as_str()),
            external_id = %id,
            "dry-run publish"
        );
        let raw = json!({
            "dry_run": true,
            "id": id,
            "media_bytes": media.map(|m| m.bytes.len()),
        });
        Ok(PublishReceipt::new(id).with_raw(raw))
    }
}
