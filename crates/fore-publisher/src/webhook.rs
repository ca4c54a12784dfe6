//! Generic HTTP adapter: POSTs the post as JSON to a configured endpoint.
//!
//! Request body:
//!
//! ```json
//! {"content": "...", "media": {"filename": "a.png", "data": "<base64>"}}
//! ```
//!
//! `media` is omitted for text-only posts. When a signing secret is
//! configured the raw body is signed with HMAC-SHA256 and sent as
//! `X-Fore-Signature-256: sha256=<hex>`.
//!
//! The response must be JSON carrying the new post id at `data.id` or `id`
//! (string or number). An optional top-level `warning` string is passed
//! through to the receipt.

use async_trait::async_trait;
use base64::Engine as _;
use fore_core::config::WebhookPlatformConfig;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::adapter::{AdapterError, MediaAttachment, PlatformAdapter, PublishReceipt};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Fore-Signature-256";

/// Longest slice of a rejection body kept in the error message.
const MAX_ERROR_BODY: usize = 512;

pub struct WebhookAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    token: Option<String>,
    signing_secret: Option<String>,
}

impl WebhookAdapter {
    pub fn new(cfg: &WebhookPlatformConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: cfg.name.clone(),
            endpoint: cfg.endpoint.clone(),
            token: cfg.token.clone(),
            signing_secret: cfg.signing_secret.clone(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for WebhookAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        content: &str,
        media: Option<&MediaAttachment>,
    ) -> Result<PublishReceipt, AdapterError> {
        let body = serde_json::to_vec(&request_body(content, media))
            .map_err(|e| AdapterError::UnexpectedResponse(format!("cannot encode request: {e}")))?;

        debug!(platform = %self.name, endpoint = %self.endpoint, bytes = body.len(), "posting to webhook");

        let mut req = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        if let Some(secret) = &self.signing_secret {
            req = req.header(SIGNATURE_HEADER, sign(secret, &body));
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            warn!(platform = %self.name, status = status.as_u16(), "webhook rejected post");
            return Err(AdapterError::Rejected {
                status: status.as_u16(),
                message: truncate(&text, MAX_ERROR_BODY),
            });
        }

        let raw: Value = serde_json::from_str(&text)
            .map_err(|e| AdapterError::UnexpectedResponse(format!("invalid JSON: {e}")))?;
        let id = extract_external_id(&raw).ok_or_else(|| {
            AdapterError::UnexpectedResponse(format!("no post id in response: {}", truncate(&text, MAX_ERROR_BODY)))
        })?;

        let mut receipt = PublishReceipt::new(id);
        if let Some(w) = raw.get("warning").and_then(Value::as_str) {
            receipt = receipt.with_warning(w);
        }
        Ok(receipt.with_raw(raw))
    }
}

fn request_body(content: &str, media: Option<&MediaAttachment>) -> Value {
    let mut body = json!({ "content": content });
    if let Some(m) = media {
        body["media"] = json!({
            "filename": m.filename,
            "data": base64::engine::general_purpose::STANDARD.encode(&m.bytes),
        });
    }
    body
}

/// `sha256=<hex>` HMAC of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Post id from `data.id` or top-level `id`; numbers are stringified.
fn extract_external_id(raw: &Value) -> Option<String> {
    let id = raw
        .get("data")
        .and_then(|d| d.get("id"))
        .or_else(|| raw.get("id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
