//! Spreadsheet values API client.
//!
//! Reads one range from one spreadsheet and classifies every failure into the
//! core [`ErrorKind`] taxonomy.
//!
//! ### Behaviour
//!
//! - **Endpoint**: `GET {base_url}/{sheet_id}/values/{range}?key={api_key}`
//! - **Validation**: key, sheet id and range are checked before any network call.
//! - **Timeout**: each attempt (send and body) races `timeout`; expiry is
//!   reported as `TIMEOUT_ERROR` and not retried.
//! - **Retries**: only transport failures (connect, DNS, reset) are retried,
//!   with linear backoff `retry_delay * attempt`.
//! - **Status mapping**: 400, 403 and 404 have dedicated kinds; everything else
//!   (including 429) is a `NETWORK_ERROR`.
//! - **Cancellation**: attempts and backoff sleeps race a `CancellationToken`.

pub mod request;
pub mod response;

pub use request::{MIN_API_KEY_LEN, ValuesRequest, redact_key};
pub use response::{ApiErrorBody, TableData};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use sheetnews_core::{AppConfig, Error, ErrorKind, RemoteError};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::retry::RetryPolicy;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "sheetnews/0.1";

/// Source of raw tabular data.
///
/// [`SheetClient`] is the production implementation; the orchestrator only
/// depends on this trait.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch_values(
        &self, api_key: &str, sheet_id: &str, range: &str, cancel: &CancellationToken,
    ) -> Result<TableData, Error>;
}

/// Sheets client configuration.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Base URL (default: https://sheets.googleapis.com/v4/spreadsheets).
    pub base_url: String,
    /// Per-attempt timeout (default: 10s).
    pub timeout: Duration,
    /// Attempts for transport failures (default: 3).
    pub max_retries: u32,
    /// Base backoff between transport retries (default: 1s).
    pub retry_delay: Duration,
    /// User-agent string (default: sheetnews/0.x).
    pub user_agent: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            base_url: sheetnews_core::config::DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl SheetConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: config.timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Outcome of a single HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    /// Connection-level failure, eligible for retry.
    Transport(reqwest::Error),
    /// Classified failure, returned as-is.
    Api(Error),
}

/// Spreadsheet values API client.
#[derive(Debug, Clone)]
pub struct SheetClient {
    http: reqwest::Client,
    config: SheetConfig,
}

impl SheetClient {
    pub fn new(config: SheetConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::unknown(format!("failed to build HTTP client: {e}")).with_cause(e))?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    /// Read `range` from `sheet_id`.
    ///
    /// A cancelled fetch returns `UNKNOWN_ERROR` ("Request cancelled"); callers
    /// that care should consult the token rather than the error.
    pub async fn fetch(
        &self, api_key: &str, sheet_id: &str, range: &str, cancel: &CancellationToken,
    ) -> Result<TableData, Error> {
        let request = ValuesRequest::new(api_key, sheet_id, range)?;
        let url = request.url(&self.config.base_url)?;
        let policy = RetryPolicy::linear(self.config.retry_delay, self.config.max_retries.max(1));
        let timeout_ms = self.config.timeout.as_millis();

        let mut attempt = 1;
        loop {
            tracing::debug!(
                attempt,
                max_attempts = policy.max_attempts,
                sheet_id,
                range,
                api_key = %redact_key(api_key),
                "fetching sheet values"
            );

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                result = tokio::time::timeout(self.config.timeout, self.attempt(url.clone())) => result,
            };

            let transport = match outcome {
                Err(_) => return Err(Error::timeout(format!("Request timed out after {timeout_ms}ms"))),
                Ok(Ok(table)) => {
                    tracing::debug!(rows = table.row_count(), "sheet values received");
                    return Ok(table);
                }
                Ok(Err(AttemptError::Api(e))) => return Err(e),
                Ok(Err(AttemptError::Transport(e))) => e,
            };

            match policy.delay_for(attempt).filter(|_| attempt < policy.max_attempts) {
                Some(wait) => {
                    tracing::warn!(attempt, wait_ms = wait.as_millis(), error = %transport, "request failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        _ = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
                None => {
                    return Err(Error::network(format!("Network error after {attempt} attempts: {transport}"))
                        .with_cause(transport));
                }
            }
        }
    }

    async fn attempt(&self, url: Url) -> Result<TableData, AttemptError> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(AttemptError::Transport)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(AttemptError::Transport)?;

        if !status.is_success() {
            return Err(AttemptError::Api(status_error(status.as_u16(), &bytes)));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            AttemptError::Api(Error::parsing(format!("Invalid response from the Sheets API: {e}")).with_cause(e))
        })
    }
}

#[async_trait]
impl SheetSource for SheetClient {
    async fn fetch_values(
        &self, api_key: &str, sheet_id: &str, range: &str, cancel: &CancellationToken,
    ) -> Result<TableData, Error> {
        self.fetch(api_key, sheet_id, range, cancel).await
    }
}

fn cancelled() -> Error {
    Error::unknown("Request cancelled")
}

/// Classify a non-success response.
fn status_error(status: u16, body: &[u8]) -> Error {
    let body = ApiErrorBody::parse(body);
    let remote = body.message();
    tracing::debug!(
        status,
        remote_message = remote.unwrap_or_default(),
        remote_status = body.error.as_ref().and_then(|e| e.status.as_deref()).unwrap_or_default(),
        "sheets API request failed"
    );

    let message = match status {
        400 => "Bad request. Check the sheet range or API parameters.".to_string(),
        403 => "API key invalid or Google Sheets API not enabled. Check your API key and enable the Google Sheets API \
                in Google Cloud Console."
            .to_string(),
        404 => "Sheet not found. Make sure the sheet ID is correct and the sheet is shared publicly.".to_string(),
        _ => format!("API request failed: {status} - {}", remote.unwrap_or("Unknown error")),
    };

    let err = Error::new(ErrorKind::from_status(status), message).with_status(status);
    match remote {
        Some(message) => err.with_cause(RemoteError { message: message.to_string() }),
        None => err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const KEY: &str = "AIzaSyDummyKeyForTests01";

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[derive(Clone, Copy)]
    enum Behaviour {
        Respond,
        Close,
        Hang,
    }

    /// Loopback server answering every connection the same way.
    async fn serve(behaviour: Behaviour, response: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = response.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    match behaviour {
                        Behaviour::Respond => {
                            let _ = socket.write_all(response.as_bytes()).await;
                            let _ = socket.shutdown().await;
                        }
                        Behaviour::Close => drop(socket),
                        Behaviour::Hang => {
                            tokio::time::sleep(Duration::from_secs(30)).await;
                            drop(socket);
                        }
                    }
                });
            }
        });

        (format!("http://{addr}/v4/spreadsheets"), hits)
    }

    fn client(base_url: String) -> SheetClient {
        SheetClient::new(SheetConfig {
            base_url,
            timeout: Duration::from_secs(2),
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
            ..Default::default()
        })
        .unwrap()
    }

    async fn fetch(client: &SheetClient) -> Result<TableData, Error> {
        client.fetch(KEY, "sheet-id", "Sheet1!A:Z", &CancellationToken::new()).await
    }

    #[test]
    fn test_config_from_app() {
        let app = AppConfig { timeout_ms: 2_500, max_retries: 5, ..Default::default() };
        let config = SheetConfig::from_app(&app);
        assert_eq!(config.timeout, Duration::from_millis(2_500));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.base_url, app.base_url);
    }

    #[test]
    fn test_status_error_messages() {
        let err = status_error(403, b"");
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert!(err.message().contains("enable the Google Sheets API"));

        let err = status_error(404, b"");
        assert_eq!(err.kind(), ErrorKind::SheetNotFound);
        assert!(err.message().contains("shared publicly"));

        let err = status_error(400, b"");
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = status_error(500, br#"{"error": {"message": "backend error"}}"#);
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(err.message(), "API request failed: 500 - backend error");
        assert!(err.source().unwrap().to_string().contains("backend error"));

        let err = status_error(502, b"");
        assert_eq!(err.message(), "API request failed: 502 - Unknown error");
        assert!(err.source().is_none());
    }

    #[tokio::test]
    async fn test_validation_skips_network() {
        let (base_url, hits) = serve(Behaviour::Respond, http_response("200 OK", "{}")).await;
        let client = client(base_url);

        let err = client.fetch("short", "sheet-id", "Sheet1!A:Z", &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidApiKey);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let body = r#"{"range": "Sheet1!A1:Z2", "values": [["Week", "Content"], ["1", "This week in tech news"]]}"#;
        let (base_url, hits) = serve(Behaviour::Respond, http_response("200 OK", body)).await;

        let table = fetch(&client(base_url)).await.unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.range.as_deref(), Some("Sheet1!A1:Z2"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_not_retried() {
        let body = r#"{"error": {"code": 403, "message": "The caller does not have permission"}}"#;
        let (base_url, hits) = serve(Behaviour::Respond, http_response("403 Forbidden", body)).await;

        let err = fetch(&client(base_url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.http_status(), Some(403));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_found() {
        let (base_url, _) = serve(Behaviour::Respond, http_response("404 Not Found", "{}")).await;
        let err = fetch(&client(base_url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SheetNotFound);
        assert_eq!(err.http_status(), Some(404));
    }

    #[tokio::test]
    async fn test_rate_limited_is_network_error() {
        let body = r#"{"error": {"message": "Quota exceeded"}}"#;
        let (base_url, hits) = serve(Behaviour::Respond, http_response("429 Too Many Requests", body)).await;

        let err = fetch(&client(base_url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert_eq!(err.http_status(), Some(429));
        assert!(err.message().contains("Quota exceeded"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_parsing_error() {
        let (base_url, _) = serve(Behaviour::Respond, http_response("200 OK", "not json")).await;
        let err = fetch(&client(base_url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParsingError);
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let (base_url, hits) = serve(Behaviour::Close, String::new()).await;

        let err = fetch(&client(base_url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(err.message().contains("after 3 attempts"));
        assert!(err.source().is_some());
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = fetch(&client(format!("http://{addr}/v4/spreadsheets"))).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NetworkError);
        assert!(err.http_status().is_none());
    }

    #[tokio::test]
    async fn test_timeout_not_retried() {
        let (base_url, hits) = serve(Behaviour::Hang, String::new()).await;
        let config = SheetConfig { timeout: Duration::from_millis(100), ..client(base_url).config };
        let client = SheetClient::new(config).unwrap();

        let err = fetch(&client).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimeoutError);
        assert_eq!(err.message(), "Request timed out after 100ms");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let (base_url, _) = serve(Behaviour::Hang, String::new()).await;
        let client = client(base_url);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client.fetch(KEY, "sheet-id", "Sheet1!A:Z", &cancel).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownError);
        assert_eq!(err.message(), "Request cancelled");
        assert!(cancel.is_cancelled());
    }
}
