//! Error taxonomy shared by the store, the query engine, and the updater.

use std::time::Duration;

use thiserror::Error;

use crate::models::Timestamp;

/// Why a remote resource could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    NotFound,
    Transient,
    Unauthorized,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Transient => "transient error",
            FetchErrorKind::Unauthorized => "unauthorized",
        };
        f.write_str(s)
    }
}

/// A field extractor rejected a single record.
///
/// Never fatal to an update: the record is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("extractor '{extractor}' rejected {record}: {reason}")]
pub struct ExtractorError {
    pub extractor: String,
    pub record: String,
    pub reason: String,
}

impl ExtractorError {
    pub fn new(
        extractor: impl Into<String>,
        record: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            extractor: extractor.into(),
            record: record.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    /// Bad context setup: unwritable or foreign-locked directories, bad settings.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("fetch of '{resource}' failed ({kind}): {message}")]
    Fetch {
        resource: String,
        kind: FetchErrorKind,
        message: String,
    },

    /// The remote chunk history cannot bridge the local timestamp to the
    /// remote head. Handled by falling back to a full update.
    #[error("no contiguous chunk chain from {local} to {head}")]
    ManifestGap { local: Timestamp, head: Timestamp },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Extractor(#[from] ExtractorError),

    /// A fetched payload could not be decoded or failed verification.
    #[error("malformed resource '{resource}': {message}")]
    Format { resource: String, message: String },

    #[error("index update timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexError {
    pub fn fetch(resource: &str, kind: FetchErrorKind, message: impl Into<String>) -> Self {
        IndexError::Fetch {
            resource: resource.to_string(),
            kind,
            message: message.into(),
        }
    }

    pub fn format(resource: &str, message: impl Into<String>) -> Self {
        IndexError::Format {
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Whether re-running the whole operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IndexError::Fetch { kind, .. } => *kind == FetchErrorKind::Transient,
            IndexError::Timeout(_) | IndexError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(IndexError::fetch("m.json", FetchErrorKind::Transient, "reset").is_retryable());
        assert!(!IndexError::fetch("m.json", FetchErrorKind::NotFound, "404").is_retryable());
        assert!(IndexError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!IndexError::InvalidQuery("x".into()).is_retryable());
    }

    #[test]
    fn extractor_error_message() {
        let err = ExtractorError::new("min", "g:a:jar:1.0", "empty groupId");
        assert_eq!(
            err.to_string(),
            "extractor 'min' rejected g:a:jar:1.0: empty groupId"
        );
    }
}
