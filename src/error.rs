// ===============================
// src/error.rs
// ===============================
use std::path::PathBuf;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Semua jenis error subsistem logging.
///
/// Config & init error bersifat fatal (tidak boleh trading tanpa jalur log),
/// sedangkan write error hanya menurunkan hasil `log_event` menjadi `false`.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("configuration invalid: {violations} violation(s)")]
    Validation { violations: usize },

    #[error("credentials path must be a non-empty string")]
    InvalidCredentialsPath,

    #[error("Firebase credentials file not found: {}", .0.display())]
    CredentialsNotFound(PathBuf),

    #[error("backend initialization failed: {0}")]
    BackendInit(#[source] BoxError),

    #[error("transient write error: {0}")]
    TransientWrite(String),

    #[error("permanent write error: {0}")]
    PermanentWrite(String),

    #[error("event_type must not be empty")]
    EmptyEventType,

    #[error("collection must not be empty")]
    EmptyCollection,
}

impl LogError {
    /// Only transient write errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::TransientWrite(_))
    }

    /// Short label for metrics / log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            LogError::Validation { .. } => "validation",
            LogError::InvalidCredentialsPath => "invalid_credentials_path",
            LogError::CredentialsNotFound(_) => "credentials_not_found",
            LogError::BackendInit(_) => "backend_init",
            LogError::TransientWrite(_) => "transient_write",
            LogError::PermanentWrite(_) => "permanent_write",
            LogError::EmptyEventType => "empty_event_type",
            LogError::EmptyCollection => "empty_collection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_writes_are_retryable() {
        assert!(LogError::TransientWrite("503".into()).is_transient());
        assert!(!LogError::PermanentWrite("403".into()).is_transient());
        assert!(!LogError::BackendInit("bad key".into()).is_transient());
        assert!(!LogError::EmptyEventType.is_transient());
    }

    #[test]
    fn credentials_not_found_mentions_path() {
        let e = LogError::CredentialsNotFound(PathBuf::from("/tmp/nope.json"));
        assert_eq!(e.to_string(), "Firebase credentials file not found: /tmp/nope.json");
        assert_eq!(e.kind(), "credentials_not_found");
    }
}
