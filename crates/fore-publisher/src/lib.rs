//! Publishing side of the engine: platform adapters, operator notifications
//! and the pipeline that takes a claimed post to `posted` or `failed`.

pub mod adapter;
pub mod dry_run;
pub mod error;
pub mod notifier;
pub mod pipeline;
pub mod registry;
pub mod webhook;

pub use adapter::{AdapterError, MediaAttachment, PlatformAdapter, PublishReceipt};
pub use dry_run::DryRunAdapter;
pub use error::{PublishError, Result};
pub use notifier::{build_notifier, EmailNotifier, LogNotifier, Notification, Notifier, NotifyError, NotifyKind};
pub use pipeline::PublishPipeline;
pub use registry::AdapterRegistry;
pub use webhook::WebhookAdapter;
