//! Error types for the conversation memory layer.
//!
//! These errors never reach callers of [`crate::Memory`] or
//! [`crate::TurnStore`]: backends convert them into fallback routing.
//! They surface only from construction helpers and configuration loading.

/// Errors that can occur in memory backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// SQLite database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis client or server error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Filesystem error (directory creation, snapshot files)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization / deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid settings
    #[error("configuration error: {0}")]
    Configuration(String),

    /// General internal error
    #[error("{0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
