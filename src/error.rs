//! Error types for configuration and delivery failures.

use thiserror::Error;

/// Errors raised synchronously at configuration time.
///
/// Routine log calls never return errors; asynchronous delivery failures
/// are isolated per sink and surface through side channels (stderr, drop
/// counters) instead.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot add sinks after logging has started")]
    SinksLocked,

    #[error("Unknown sink: {0}")]
    UnknownSink(String),

    #[error("Invalid filter rule: {0}")]
    InvalidFilterRule(String),

    #[error("Invalid compact filter: {0}")]
    InvalidCompactFilter(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Error produced by a single batch delivery attempt.
///
/// Carries a human-readable reason; the batch engine retries per its
/// policy and reports each failed attempt to `on_batch_error`.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BatchError(pub String);

impl BatchError {
    pub fn new(msg: impl Into<String>) -> Self {
        BatchError(msg.into())
    }
}
