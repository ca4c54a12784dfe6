use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid time zone: {0}")]
    InvalidTimeZone(String),
}

pub type Result<T> = std::result::Result<T, ForeError>;
