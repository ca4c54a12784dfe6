use fore_core::ForeError;
use fore_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The post store could not be read or written. The tick is abandoned.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ForeError),

    #[error("Unknown quick pick: {0}")]
    UnknownQuickPick(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
