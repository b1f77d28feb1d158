//! Observable slot state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sheetnews_core::{Error, ErrorKind};

use crate::extract::ExtractedContent;

/// Lifecycle of a content slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Where the visible data came from, as last reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    #[default]
    Miss,
    Hit,
    /// Cached data stays visible while a silent fetch is in flight.
    Revalidating,
    Cleared,
}

/// Point-in-time copy of a slot.
#[derive(Debug, Clone, Default)]
pub struct SlotSnapshot {
    pub data: Option<ExtractedContent>,
    pub loading: bool,
    pub error: Option<Error>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub cache_status: CacheStatus,
    pub phase: Phase,
}

impl SlotSnapshot {
    /// Extracted text, if any.
    pub fn content(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.text.as_str())
    }

    /// Data present, nothing loading, no error.
    pub fn is_ready(&self) -> bool {
        !self.loading && self.error.is_none() && self.data.is_some()
    }

    pub(crate) fn begin_loading(&mut self) {
        self.loading = true;
        self.error = None;
        self.cache_status = CacheStatus::Miss;
        self.phase = Phase::Loading;
    }

    pub(crate) fn begin_revalidating(&mut self) {
        self.error = None;
        self.cache_status = CacheStatus::Revalidating;
    }

    pub(crate) fn succeed(&mut self, content: ExtractedContent, cache_status: CacheStatus) {
        self.data = Some(content);
        self.error = None;
        self.loading = false;
        self.cache_status = cache_status;
        self.phase = Phase::Ready;
    }

    /// Record a failure, keeping any previously visible data.
    pub(crate) fn fail(&mut self, error: Error) {
        self.error = Some(error);
        self.loading = false;
        if self.cache_status == CacheStatus::Revalidating {
            self.cache_status = CacheStatus::Miss;
        }
        self.phase = Phase::Failed;
    }

    /// Drop the loading flag after cancellation and settle the phase on what is visible.
    pub(crate) fn settle(&mut self) {
        self.loading = false;
        if self.cache_status == CacheStatus::Revalidating {
            self.cache_status = CacheStatus::Miss;
        }
        if self.phase == Phase::Loading {
            self.phase = match (&self.data, &self.error) {
                (_, Some(_)) => Phase::Failed,
                (Some(_), None) => Phase::Ready,
                (None, None) => Phase::Idle,
            };
        }
    }
}

/// Summary flags for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub phase: Phase,
    pub is_loading: bool,
    pub has_error: bool,
    pub has_data: bool,
    pub last_fetch: Option<DateTime<Utc>>,
    pub cache_status: CacheStatus,
    pub is_configured: bool,
    /// An error is present and another attempt could change the outcome.
    pub can_retry: bool,
}

impl Status {
    pub(crate) fn new(snapshot: &SlotSnapshot, is_configured: bool) -> Self {
        Self {
            phase: snapshot.phase,
            is_loading: snapshot.loading,
            has_error: snapshot.error.is_some(),
            has_data: snapshot.data.is_some(),
            last_fetch: snapshot.last_fetch,
            cache_status: snapshot.cache_status,
            is_configured,
            can_retry: snapshot.error.as_ref().is_some_and(|e| e.kind() != ErrorKind::InvalidApiKey),
        }
    }
}
