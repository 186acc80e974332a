//! Custom error types for the delta updater.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    /// Network/HTTP failure or non-success status while fetching `target`.
    #[error("Retrieval of {target} failed{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Retrieval {
        target: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Unsupported encoding '{encoding}' for {path}")]
    UnsupportedEncoding { path: String, encoding: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Unsafe relative path: {0}")]
    UnsafePath(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl UpdaterError {
    /// Build a retrieval error for `target` without an HTTP status.
    pub fn retrieval(target: impl Into<String>, message: impl ToString) -> Self {
        UpdaterError::Retrieval {
            target: target.into(),
            status: None,
            message: message.to_string(),
        }
    }

    /// True for errors that make a whole check cycle unusable.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            UpdaterError::MalformedManifest(_)
                | UpdaterError::Retrieval { .. }
                | UpdaterError::Authentication(_)
                | UpdaterError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_display_with_status() {
        let err = UpdaterError::Retrieval {
            target: "manifest.json".to_string(),
            status: Some(404),
            message: "Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Retrieval of manifest.json failed (HTTP 404): Not Found"
        );
    }

    #[test]
    fn test_retrieval_display_without_status() {
        let err = UpdaterError::retrieval("bin/app.dll", "connection reset");
        assert_eq!(
            err.to_string(),
            "Retrieval of bin/app.dll failed: connection reset"
        );
        assert!(err.is_structural());
    }

    #[test]
    fn test_cycle_level_errors_are_structural() {
        assert!(UpdaterError::MalformedManifest("missing 'files'".to_string()).is_structural());
        assert!(UpdaterError::Authentication("HTTP 401".to_string()).is_structural());
        assert!(!UpdaterError::Cancelled.is_structural());
        assert!(!UpdaterError::UnsafePath("../x".to_string()).is_structural());
    }

    #[test]
    fn test_checksum_mismatch_is_not_structural() {
        let err = UpdaterError::ChecksumMismatch {
            path: "c.txt".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(!err.is_structural());
        assert!(err.to_string().contains("c.txt"));
    }
}
