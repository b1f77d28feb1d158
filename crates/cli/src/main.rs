//! sheetnews entry point.
//!
//! Loads configuration, builds the shared cache and the sheets client, and runs
//! one command against a single content slot. Logs go to stderr so that stdout
//! only carries the content.

use std::sync::Arc;

use anyhow::Result;
use sheetnews_client::{ContentOrchestrator, ExtractedContent, SheetClient, SheetConfig, SlotConfig, SlotEvent};
use sheetnews_core::{AppConfig, CacheDb, CacheStore};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

mod command;
mod error;

use command::Command;
use error::CliError;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let arg = std::env::args().nth(1);
    let command = Command::parse(arg.as_deref())?;
    let config = AppConfig::load()?;

    tracing::info!(%command, "starting sheetnews");

    let cache = Arc::new(build_cache(&config).await);
    let cleanup = cache.spawn_cleanup();

    let client = Arc::new(SheetClient::new(SheetConfig::from_app(&config))?);
    let slot = ContentOrchestrator::new(client, cache.clone(), SlotConfig::from_app(&config));
    let forwarder = tokio::spawn(log_events(slot.subscribe()));

    let result = tokio::select! {
        result = command.run(&slot, &cache) => result,
        _ = tokio::signal::ctrl_c() => {
            slot.cancel();
            Err(CliError::Interrupted)
        }
    };

    cleanup.shutdown().await;
    cache.flush().await;
    forwarder.abort();

    Ok(result?)
}

/// Persistent when `db_path` is set, in-memory otherwise.
async fn build_cache(config: &AppConfig) -> CacheStore<ExtractedContent> {
    let Some(path) = config.db_path.as_ref().filter(|_| config.enable_cache) else {
        return CacheStore::new(config.cache_config());
    };

    match CacheDb::open(path).await {
        Ok(db) => CacheStore::with_persistence(config.cache_config(), db).await,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache database unavailable, using memory only");
            CacheStore::new(config.cache_config())
        }
    }
}

async fn log_events(mut events: broadcast::Receiver<SlotEvent>) {
    loop {
        match events.recv().await {
            Ok(SlotEvent::Loading) => tracing::debug!("slot loading"),
            Ok(SlotEvent::Ready { content, source }) => {
                tracing::info!(?source, column = %content.source_column, rows = content.row_count, "slot ready")
            }
            Ok(SlotEvent::Failed(error)) => {
                tracing::warn!(kind = %error.kind(), error = %error.message(), "slot failed")
            }
            Ok(SlotEvent::Cancelled) => tracing::info!("slot cancelled"),
            Ok(SlotEvent::CacheCleared) => tracing::info!("slot cache cleared"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => tracing::debug!(skipped, "slot events lagged"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
