//! Fetch outcomes and slot notifications.

use serde::Serialize;
use sheetnews_core::Error;

use crate::extract::ExtractedContent;

/// Origin of delivered content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentSource {
    Cache,
    Network,
}

/// Successfully delivered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: ExtractedContent,
    pub source: ContentSource,
}

/// Result of a fetch, refresh or retry.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Ready(Fetched),
    Failed(Error),
    /// Superseded or cancelled; slot state was left untouched.
    Cancelled,
}

impl FetchOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchOutcome::Ready(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchOutcome::Cancelled)
    }

    pub fn fetched(&self) -> Option<&Fetched> {
        match self {
            FetchOutcome::Ready(fetched) => Some(fetched),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            FetchOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Collapse into a `Result`; cancellation becomes `UNKNOWN_ERROR`.
    pub fn into_result(self) -> Result<Fetched, Error> {
        match self {
            FetchOutcome::Ready(fetched) => Ok(fetched),
            FetchOutcome::Failed(error) => Err(error),
            FetchOutcome::Cancelled => Err(Error::unknown("Request cancelled")),
        }
    }
}

/// Notification broadcast to slot subscribers.
#[derive(Debug, Clone)]
pub enum SlotEvent {
    Loading,
    Ready { content: ExtractedContent, source: ContentSource },
    Failed(Error),
    Cancelled,
    CacheCleared,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetnews_core::ErrorKind;

    #[test]
    fn test_cancelled_into_result() {
        let err = FetchOutcome::Cancelled.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownError);
        assert_eq!(err.message(), "Request cancelled");
    }

    #[test]
    fn test_failed_accessors() {
        let outcome = FetchOutcome::Failed(Error::parsing("Sheet is empty. Make sure your sheet has content."));
        assert!(!outcome.is_ready());
        assert!(outcome.fetched().is_none());
        assert_eq!(outcome.error().map(Error::kind), Some(ErrorKind::ParsingError));
    }
}
