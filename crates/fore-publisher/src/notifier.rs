use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fore_core::config::EmailConfig;
use fore_core::{ForeConfig, Post, PostId};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifier configuration error: {0}")]
    Config(String),

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("Failed to deliver notification: {0}")]
    Transport(String),
}

/// Outcome a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    /// The post went out.
    Success,
    /// The platform refused or could not be reached; the post is `failed`.
    Failure,
    /// The engine itself broke while handling the post.
    Error,
}

impl NotifyKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotifyKind::Success => "Post Successfully Published",
            NotifyKind::Failure => "Post Failed",
            NotifyKind::Error => "Scheduler Error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Success => "success",
            NotifyKind::Failure => "failure",
            NotifyKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotifyKind,
    pub post_id: PostId,
    pub platform: String,
    pub content: String,
    /// Platform response on success, the error message otherwise.
    pub details: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(kind: NotifyKind, post: &Post, details: impl Into<String>) -> Self {
        Self {
            kind,
            post_id: post.id.clone(),
            platform: post.platform.clone(),
            content: post.content.clone(),
            details: details.into(),
            at: Utc::now(),
        }
    }

    pub fn subject(&self) -> &'static str {
        self.kind.subject()
    }

    pub fn body(&self) -> String {
        let label = match self.kind {
            NotifyKind::Success => "Response",
            NotifyKind::Failure | NotifyKind::Error => "Error",
        };
        format!(
            "Post ID: {}\nPlatform: {}\nContent: {}\n{}: {}\nTime: {}\n",
            self.post_id,
            self.platform,
            self.content,
            label,
            self.details,
            self.at.to_rfc3339(),
        )
    }
}

/// Out-of-band channel that tells an operator how a publish ended.
///
/// Callers treat delivery as best effort: a failed `send` is logged and never
/// changes the post's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used outside production.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
        match n.kind {
            NotifyKind::Success => info!(
                post_id = %n.post_id,
                platform = %n.platform,
                subject = n.subject(),
                details = %n.details,
                "notification"
            ),
            NotifyKind::Failure | NotifyKind::Error => warn!(
                post_id = %n.post_id,
                platform = %n.platform,
                subject = n.subject(),
                details = %n.details,
                "notification"
            ),
        }
        Ok(())
    }
}

/// Sends notifications as plain-text e-mail over SMTP.
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(cfg: &EmailConfig) -> Result<Self, NotifyError> {
        let from = cfg
            .sender
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("invalid sender address: {e}")))?;
        let to = cfg
            .recipient
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("invalid recipient address: {e}")))?;

        let builder = if cfg.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
        }
        .map_err(|e| NotifyError::Config(format!("cannot configure SMTP transport: {e}")))?
        .port(cfg.smtp_port);

        let builder = match (&cfg.username, &cfg.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(n.subject())
            .header(header::ContentType::TEXT_PLAIN)
            .body(n.body())
            .map_err(|e| NotifyError::Message(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        info!(post_id = %n.post_id, subject = n.subject(), "notification e-mail sent");
        Ok(())
    }
}

/// Pick the notifier for this deployment: e-mail in production when SMTP is
/// configured, the log otherwise.
pub fn build_notifier(cfg: &ForeConfig) -> Arc<dyn Notifier> {
    match (&cfg.notifications.email, cfg.app.mode.is_production()) {
        (Some(email), true) => match EmailNotifier::new(email) {
            Ok(n) => {
                info!(host = %email.smtp_host, recipient = %email.recipient, "e-mail notifications enabled");
                Arc::new(n)
            }
            Err(e) => {
                error!(error = %e, "e-mail notifier misconfigured, falling back to log");
                Arc::new(LogNotifier)
            }
        },
        (None, true) => {
            warn!("production mode without [notifications.email]; notifications are logged only");
            Arc::new(LogNotifier)
        }
        _ => Arc::new(LogNotifier),
    }
}
