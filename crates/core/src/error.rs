//! Typed error taxonomy for sheetnews.
//!
//! Every failure in the fetch pipeline is reported as an [`Error`] carrying one
//! of a fixed set of [`ErrorKind`]s. The kinds serialize to the
//! `SCREAMING_SNAKE_CASE` codes shown to diagnostics (e.g. `SHEET_NOT_FOUND`).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Shared, cloneable lower-level cause.
pub type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Fixed enumeration of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidApiKey,
    SheetNotFound,
    PermissionDenied,
    NetworkError,
    TimeoutError,
    ParsingError,
    ValidationError,
    UnknownError,
}

impl ErrorKind {
    /// Wire code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidApiKey => "INVALID_API_KEY",
            ErrorKind::SheetNotFound => "SHEET_NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::TimeoutError => "TIMEOUT_ERROR",
            ErrorKind::ParsingError => "PARSING_ERROR",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Map a non-success HTTP status to an error kind.
    ///
    /// 429 is reported as a network error so that rate limiting is retried.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::ValidationError,
            403 => ErrorKind::PermissionDenied,
            404 => ErrorKind::SheetNotFound,
            _ => ErrorKind::NetworkError,
        }
    }

    /// Whether the orchestrator may retry an operation that failed with this kind.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::TimeoutError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with optional HTTP status and wrapped cause.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    http_status: Option<u16>,
    #[source]
    cause: Option<Cause>,
    timestamp: DateTime<Utc>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), http_status: None, cause: None, timestamp: Utc::now() }
    }

    pub fn invalid_api_key(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidApiKey, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParsingError, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownError, message)
    }

    /// Attach the HTTP status that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach a lower-level cause.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach an already shared cause.
    pub fn with_shared_cause(mut self, cause: Cause) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Technical description, suitable for a diagnostics panel.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn cause(&self) -> Option<&Cause> {
        self.cause.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Generic text for end users; technical detail stays in [`Error::message`].
    pub fn user_message(&self) -> &'static str {
        match self.kind {
            ErrorKind::InvalidApiKey | ErrorKind::PermissionDenied => {
                "The news feed is not configured correctly. Please try again later."
            }
            ErrorKind::SheetNotFound => "The news source could not be found.",
            ErrorKind::NetworkError | ErrorKind::TimeoutError => {
                "Unable to reach the news source. Check your connection and try again."
            }
            ErrorKind::ParsingError | ErrorKind::ValidationError => "This week's news is not available yet.",
            ErrorKind::UnknownError => "Something went wrong while loading the news.",
        }
    }
}

/// Error payload returned by the remote API (`{"error": {"message": ...}}`).
#[derive(Debug, Clone, thiserror::Error)]
#[error("remote error: {message}")]
pub struct RemoteError {
    pub message: String,
}

/// Failures of the durable cache medium.
///
/// These never reach the fetch pipeline: the cache store logs and swallows them.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A persisted record could not be encoded.
    #[error("CACHE_ERROR: failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tokio_rusqlite::Error<StorageError>> for StorageError {
    fn from(err: tokio_rusqlite::Error<StorageError>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => StorageError::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => StorageError::Database(tokio_rusqlite::Error::Close(c)),
            _ => StorageError::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for StorageError {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        StorageError::Database(err)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = Error::parsing("Sheet is empty");
        assert!(err.to_string().contains("PARSING_ERROR"));
        assert!(err.to_string().contains("Sheet is empty"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorKind::from_status(400), ErrorKind::ValidationError);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::SheetNotFound);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::NetworkError);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::NetworkError);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::NetworkError);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::TimeoutError.is_retryable());
        assert!(!ErrorKind::InvalidApiKey.is_retryable());
        assert!(!ErrorKind::PermissionDenied.is_retryable());
        assert!(!ErrorKind::SheetNotFound.is_retryable());
        assert!(!ErrorKind::ParsingError.is_retryable());
        assert!(!ErrorKind::ValidationError.is_retryable());
    }

    #[test]
    fn test_kind_serializes_as_code() {
        let json = serde_json::to_string(&ErrorKind::SheetNotFound).unwrap();
        assert_eq!(json, "\"SHEET_NOT_FOUND\"");
        assert_eq!(ErrorKind::TimeoutError.to_string(), "TIMEOUT_ERROR");
    }

    #[test]
    fn test_cause_is_exposed_as_source() {
        let err = Error::network("API request failed: 500")
            .with_status(500)
            .with_cause(RemoteError { message: "backend unavailable".into() });

        assert_eq!(err.http_status(), Some(500));
        let source = err.source().expect("cause should be the error source");
        assert!(source.to_string().contains("backend unavailable"));
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::MigrationFailed("bad version".into());
        assert!(err.to_string().contains("CACHE_ERROR"));
        assert!(err.to_string().contains("bad version"));
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = Error::new(ErrorKind::PermissionDenied, "API key invalid or Google Sheets API not enabled");
        assert!(!err.user_message().contains("API key"));
    }
}
