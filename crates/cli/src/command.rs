//! Commands run against a single content slot.

use std::fmt;

use sheetnews_client::{ContentOrchestrator, ExtractedContent, FetchOptions, FetchOutcome, SheetSource};
use sheetnews_core::{CacheStore, Error};

use crate::error::CliError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Print the weekly content.
    Fetch,
    /// Check that the sheet is reachable.
    Probe,
    /// Fetch twice and print cache statistics.
    Stats,
}

impl Command {
    /// Parse the first CLI argument; no argument means `fetch`.
    pub fn parse(arg: Option<&str>) -> Result<Self, CliError> {
        match arg {
            None | Some("fetch") => Ok(Command::Fetch),
            Some("probe") => Ok(Command::Probe),
            Some("stats") => Ok(Command::Stats),
            Some(other) => Err(CliError::UnknownCommand(other.to_string())),
        }
    }

    pub async fn run<S: SheetSource + 'static>(
        self, slot: &ContentOrchestrator<S>, cache: &CacheStore<ExtractedContent>,
    ) -> Result<(), CliError> {
        match self {
            Command::Fetch => {
                let fetched = fetch_with_retry(slot).await?;
                println!("{}", fetched.text);
                Ok(())
            }
            Command::Probe => match slot.test_connection().await {
                Ok(()) => {
                    println!("Connection successful");
                    Ok(())
                }
                Err(error) => Err(report(&error)),
            },
            Command::Stats => {
                fetch_with_retry(slot).await?;
                slot.fetch(FetchOptions::default()).await;

                let stats = cache.stats();
                let summary = serde_json::json!({
                    "stats": stats,
                    "hit_rate": stats.hit_rate(),
                    "total_requests": stats.total_requests(),
                    "status": slot.status(),
                });
                println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string()));
                Ok(())
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Fetch => "fetch",
            Command::Probe => "probe",
            Command::Stats => "stats",
        };
        f.write_str(name)
    }
}

/// Fetch once, escalating to the slot's retry loop when the failure is transient.
async fn fetch_with_retry<S>(slot: &ContentOrchestrator<S>) -> Result<ExtractedContent, CliError>
where
    S: SheetSource + 'static,
{
    let outcome = match slot.fetch(FetchOptions::default()).await {
        FetchOutcome::Failed(error) if error.is_retryable() => {
            tracing::warn!(kind = %error.kind(), error = %error.message(), "fetch failed, retrying");
            slot.retry().await
        }
        outcome => outcome,
    };

    match outcome {
        FetchOutcome::Ready(fetched) => Ok(fetched.content),
        FetchOutcome::Failed(error) => Err(report(&error)),
        FetchOutcome::Cancelled => Err(CliError::Interrupted),
    }
}

/// Print the user-facing message with technical detail.
fn report(error: &Error) -> CliError {
    eprintln!("{}", error.user_message());
    eprintln!("  {}: {}", error.kind(), error.message());
    if let Some(status) = error.http_status() {
        eprintln!("  HTTP status: {status}");
    }
    CliError::Failed(error.kind())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(None).unwrap(), Command::Fetch);
        assert_eq!(Command::parse(Some("fetch")).unwrap(), Command::Fetch);
        assert_eq!(Command::parse(Some("probe")).unwrap(), Command::Probe);
        assert_eq!(Command::parse(Some("stats")).unwrap(), Command::Stats);
        assert!(matches!(Command::parse(Some("nope")), Err(CliError::UnknownCommand(_))));
    }

    #[test]
    fn test_report_keeps_kind() {
        let err = report(&Error::parsing("Sheet is empty. Make sure your sheet has content."));
        assert!(matches!(err, CliError::Failed(sheetnews_core::ErrorKind::ParsingError)));
    }
}
