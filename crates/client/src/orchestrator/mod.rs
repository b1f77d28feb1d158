//! Per-slot content controller.
//!
//! A [`ContentOrchestrator`] owns the state of one content slot and composes
//! the cache, a [`SheetSource`] and the extractor:
//!
//! 1. Validate credentials.
//! 2. Serve a live cache entry unless the fetch is forced.
//! 3. Otherwise fetch, extract, cache and publish the result.
//!
//! Every operation runs under a child of the slot's epoch token. `cancel()`
//! cancels the epoch and installs a fresh one; a newer network fetch cancels
//! the previous one. Results arriving under a cancelled token are discarded
//! without touching slot state.

mod events;
mod state;

pub use events::{ContentSource, FetchOutcome, Fetched, SlotEvent};
pub use state::{CacheStatus, Phase, SlotSnapshot, Status};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use sheetnews_core::{AppConfig, CacheKey, CacheStore, Error};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::extract::{ExtractOptions, ExtractedContent, extract_content};
use crate::retry::RetryPolicy;
use crate::sheets::{SheetSource, redact_key};

/// Range read by [`ContentOrchestrator::test_connection`].
pub const CONNECTION_TEST_RANGE: &str = "Sheet1!A1:A1";

const EVENT_CAPACITY: usize = 32;

/// Settings of one content slot.
#[derive(Clone, PartialEq, Eq)]
pub struct SlotConfig {
    pub api_key: Option<String>,
    pub sheet_id: Option<String>,
    /// Cell range (default: Sheet1!A:Z).
    pub range: String,
    /// Lifetime of cached content (default: 5 minutes).
    pub cache_ttl: Duration,
    pub enable_cache: bool,
    /// Fetch once on creation.
    pub auto_fetch: bool,
    /// Attempts made by [`ContentOrchestrator::retry`] (default: 3).
    pub retry_count: u32,
    /// Base of the exponential retry wait (default: 1s).
    pub retry_delay: Duration,
    pub extract: ExtractOptions,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            sheet_id: None,
            range: sheetnews_core::config::DEFAULT_RANGE.to_string(),
            cache_ttl: Duration::from_secs(300),
            enable_cache: true,
            auto_fetch: false,
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            extract: ExtractOptions::default(),
        }
    }
}

impl fmt::Debug for SlotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotConfig")
            .field("api_key", &self.api_key.as_deref().map(redact_key))
            .field("sheet_id", &self.sheet_id)
            .field("range", &self.range)
            .field("cache_ttl", &self.cache_ttl)
            .field("enable_cache", &self.enable_cache)
            .field("auto_fetch", &self.auto_fetch)
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("extract", &self.extract)
            .finish()
    }
}

impl SlotConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            sheet_id: config.sheet_id.clone(),
            range: config.range.clone(),
            cache_ttl: config.cache_ttl(),
            enable_cache: config.enable_cache,
            auto_fetch: config.auto_fetch,
            retry_count: config.max_retries,
            retry_delay: config.retry_delay(),
            extract: ExtractOptions::from_app(config),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
            && self.sheet_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Cache namespace of this slot, `google-sheets-{sheet_id}`.
    pub fn namespace(&self) -> Option<String> {
        self.sheet_id.as_deref().filter(|id| !id.is_empty()).map(|id| format!("google-sheets-{id}"))
    }

    /// Cache key of this slot: namespace plus range and extraction options.
    pub fn cache_key(&self) -> Option<CacheKey> {
        self.namespace().map(|ns| CacheKey::builder(ns).param(&self.range).param(&self.extract).build())
    }

    fn credentials(&self) -> Result<(String, String), Error> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::invalid_api_key("API key is required"))?;
        let sheet_id = self
            .sheet_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::validation("Sheet ID is required"))?;
        Ok((api_key.to_string(), sheet_id.to_string()))
    }
}

/// Fetch flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the cache lookup.
    pub force: bool,
    /// Keep the visible data and loading flag untouched while fetching.
    pub silent: bool,
}

impl FetchOptions {
    pub fn force() -> Self {
        Self { force: true, silent: false }
    }

    pub fn silent() -> Self {
        Self { force: true, silent: true }
    }
}

#[derive(Debug)]
struct Inner {
    config: SlotConfig,
    state: SlotSnapshot,
    epoch: CancellationToken,
    /// Token of the newest network fetch, tagged with its sequence number.
    inflight: Option<(u64, CancellationToken)>,
    sequence: u64,
}

/// Controller of one content slot.
pub struct ContentOrchestrator<S> {
    source: Arc<S>,
    cache: Arc<CacheStore<ExtractedContent>>,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SlotEvent>,
}

impl<S> fmt::Debug for ContentOrchestrator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentOrchestrator").field("inner", &self.inner).finish_non_exhaustive()
    }
}

impl<S: SheetSource + 'static> ContentOrchestrator<S> {
    pub fn new(source: Arc<S>, cache: Arc<CacheStore<ExtractedContent>>, config: SlotConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            cache,
            inner: Mutex::new(Inner {
                config,
                state: SlotSnapshot::default(),
                epoch: CancellationToken::new(),
                inflight: None,
                sequence: 0,
            }),
            events,
        }
    }

    /// Build a shared orchestrator, fetching once in the background when
    /// `auto_fetch` is set and credentials are present.
    pub fn create(source: Arc<S>, cache: Arc<CacheStore<ExtractedContent>>, config: SlotConfig) -> Arc<Self> {
        let this = Arc::new(Self::new(source, cache, config));
        this.spawn_auto_fetch();
        this
    }

    /// Receive slot notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SlotEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> SlotConfig {
        self.lock().config.clone()
    }

    /// Fetch content, serving from the cache unless `options.force`.
    pub async fn fetch(&self, options: FetchOptions) -> FetchOutcome {
        let (config, api_key, sheet_id, token, sequence) = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            let (api_key, sheet_id) = match inner.config.credentials() {
                Ok(credentials) => credentials,
                Err(error) => {
                    inner.state.fail(error.clone());
                    self.emit(SlotEvent::Failed(error.clone()));
                    return FetchOutcome::Failed(error);
                }
            };

            if !options.force
                && inner.config.enable_cache
                && let Some(key) = inner.config.cache_key()
                && let Some(content) = self.cache.get(&key)
            {
                tracing::debug!(sheet_id = %sheet_id, "using cached sheet content");
                inner.state.succeed(content.clone(), CacheStatus::Hit);
                self.emit(SlotEvent::Ready { content: content.clone(), source: ContentSource::Cache });
                return FetchOutcome::Ready(Fetched { content, source: ContentSource::Cache });
            }

            inner.sequence += 1;
            let token = inner.epoch.child_token();
            if let Some((_, previous)) = inner.inflight.replace((inner.sequence, token.clone())) {
                previous.cancel();
            }

            if options.silent {
                inner.state.begin_revalidating();
            } else {
                inner.state.begin_loading();
                self.emit(SlotEvent::Loading);
            }

            (inner.config.clone(), api_key, sheet_id, token, inner.sequence)
        };

        tracing::info!(
            sheet_id = %sheet_id,
            range = %config.range,
            silent = options.silent,
            "fetching fresh sheet content"
        );

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.source.fetch_values(&api_key, &sheet_id, &config.range, &token) => Some(result),
        };

        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some(result) = result.filter(|_| !token.is_cancelled()) else {
            tracing::debug!(sheet_id = %sheet_id, "fetch cancelled");
            return FetchOutcome::Cancelled;
        };

        if inner.inflight.as_ref().is_some_and(|(seq, _)| *seq == sequence) {
            inner.inflight = None;
        }

        match result.and_then(|table| extract_content(&table, &config.extract)) {
            Ok(content) => {
                if config.enable_cache
                    && let Some(key) = config.cache_key()
                {
                    self.cache.set(key, content.clone(), config.cache_ttl);
                }
                inner.state.succeed(content.clone(), CacheStatus::Miss);
                inner.state.last_fetch = Some(chrono::Utc::now());
                tracing::info!(sheet_id = %sheet_id, length = content.text.len(), "sheet content updated");
                self.emit(SlotEvent::Ready { content: content.clone(), source: ContentSource::Network });
                FetchOutcome::Ready(Fetched { content, source: ContentSource::Network })
            }
            Err(error) => {
                tracing::warn!(
                    sheet_id = %sheet_id,
                    kind = %error.kind(),
                    error = %error.message(),
                    "sheet fetch failed"
                );
                inner.state.fail(error.clone());
                self.emit(SlotEvent::Failed(error.clone()));
                FetchOutcome::Failed(error)
            }
        }
    }

    /// Forced fetch.
    pub async fn refresh(&self) -> FetchOutcome {
        self.fetch(FetchOptions::force()).await
    }

    /// Retry with exponential waits, `retry_delay * 2^(attempt - 1)` before
    /// each attempt.
    ///
    /// Stops on success, on cancellation, and on the first error that cannot
    /// be fixed by retrying (returned unchanged). Exhaustion yields
    /// "Failed after N attempts" with the kind and cause of the last error.
    pub async fn retry(&self) -> FetchOutcome {
        let (policy, token) = {
            let inner = self.lock();
            (RetryPolicy::exponential(inner.config.retry_delay, inner.config.retry_count), inner.epoch.child_token())
        };

        let mut last_error = None;
        let mut attempt = 1;
        while let Some(wait) = policy.delay_for(attempt) {
            tracing::info!(attempt, max_attempts = policy.max_attempts, wait_ms = wait.as_millis(), "retry attempt");
            tokio::select! {
                biased;
                _ = token.cancelled() => return FetchOutcome::Cancelled,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.fetch(FetchOptions::force()).await {
                FetchOutcome::Failed(error) if error.is_retryable() => last_error = Some(error),
                outcome => return outcome,
            }
            attempt += 1;
        }

        let error = exhausted(policy.max_attempts, last_error);
        let mut inner = self.lock();
        if token.is_cancelled() {
            return FetchOutcome::Cancelled;
        }
        inner.state.fail(error.clone());
        self.emit(SlotEvent::Failed(error.clone()));
        FetchOutcome::Failed(error)
    }

    /// Cancel in-flight fetches and pending retry waits. Cached data is kept.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.epoch.cancel();
        inner.epoch = CancellationToken::new();
        inner.inflight = None;
        inner.state.settle();
        tracing::debug!("slot operations cancelled");
        self.emit(SlotEvent::Cancelled);
    }

    /// Probe the endpoint with a single-cell read.
    ///
    /// Only the loading flag is touched; neither the cache nor the slot data
    /// change.
    pub async fn test_connection(&self) -> Result<(), Error> {
        let (api_key, sheet_id, token) = {
            let mut inner = self.lock();
            let (api_key, sheet_id) = inner.config.credentials()?;
            inner.state.loading = true;
            (api_key, sheet_id, inner.epoch.child_token())
        };

        tracing::info!(sheet_id = %sheet_id, "testing sheets API connection");
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::unknown("Request cancelled")),
            result = self.source.fetch_values(&api_key, &sheet_id, CONNECTION_TEST_RANGE, &token) => result.map(|_| ()),
        };

        let mut inner = self.lock();
        if inner.inflight.is_none() {
            inner.state.loading = false;
        }
        match &result {
            Ok(()) => tracing::info!("connection test successful"),
            Err(e) => tracing::warn!(kind = %e.kind(), error = %e.message(), "connection test failed"),
        }
        result
    }

    /// Remove this slot's entries from the cache. Returns the number removed.
    pub fn clear_cache(&self) -> usize {
        let mut inner = self.lock();
        let Some(namespace) = inner.config.namespace().filter(|_| inner.config.enable_cache) else {
            return 0;
        };
        let removed = self.cache.clear_namespace(&namespace);
        inner.state.cache_status = CacheStatus::Cleared;
        tracing::info!(namespace = %namespace, removed, "slot cache cleared");
        self.emit(SlotEvent::CacheCleared);
        removed
    }

    /// Whether a live cache entry exists for the current configuration.
    pub fn has_cached_data(&self) -> bool {
        let inner = self.lock();
        inner.config.enable_cache && inner.config.cache_key().is_some_and(|key| self.cache.has(&key))
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        self.lock().state.clone()
    }

    pub fn status(&self) -> Status {
        let inner = self.lock();
        Status::new(&inner.state, inner.config.is_configured())
    }

    /// Replace the configuration, dropping all state and in-flight work.
    pub fn reconfigure(self: &Arc<Self>, config: SlotConfig) {
        {
            let mut inner = self.lock();
            inner.epoch.cancel();
            inner.epoch = CancellationToken::new();
            inner.inflight = None;
            inner.state = SlotSnapshot::default();
            tracing::debug!(config = ?config, "slot reconfigured");
            inner.config = config;
        }
        self.spawn_auto_fetch();
    }

    fn spawn_auto_fetch(self: &Arc<Self>) {
        let config = self.config();
        if !config.auto_fetch || !config.is_configured() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.fetch(FetchOptions::default()).await;
        });
    }

    fn emit(&self, event: SlotEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S> Drop for ContentOrchestrator<S> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.epoch.cancel();
    }
}

fn exhausted(attempts: u32, last_error: Option<Error>) -> Error {
    let message = format!("Failed after {attempts} attempts");
    match last_error {
        Some(last) => {
            let mut error = Error::new(last.kind(), message);
            if let Some(status) = last.http_status() {
                error = error.with_status(status);
            }
            error.with_cause(last)
        }
        None => Error::unknown(message),
    }
}
