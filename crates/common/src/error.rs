//! Error types for roversign-rs.

use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Infrastructure Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A gated write could not acquire the lock in time and was abandoned.
    #[error("Write lock timed out after {0:?}")]
    LockTimeout(std::time::Duration),

    /// Delivery to a single recipient failed.
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// An observer callback failed.
    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns a stable error code for logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::LockTimeout(_) => "LOCK_TIMEOUT",
            Self::Delivery(_) => "DELIVERY_ERROR",
            Self::Hook(_) => "HOOK_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error looks like on-disk database corruption.
    ///
    /// Activity reads degrade to "no data" on these instead of failing.
    #[must_use]
    pub fn is_storage_corruption(&self) -> bool {
        match self {
            Self::Database(msg) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("malformed") || msg.contains("corrupt")
            }
            _ => false,
        }
    }
}

// === From implementations ===

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
