//! Client code for sheetnews.
//!
//! This crate provides the spreadsheet values client, content extraction,
//! retry scheduling and the per-slot orchestrator built on top of them.

pub mod extract;
pub mod orchestrator;
pub mod retry;
pub mod sheets;

pub use extract::{ExtractOptions, ExtractedContent, extract_content};
pub use orchestrator::{
    CacheStatus, ContentOrchestrator, ContentSource, FetchOptions, FetchOutcome, Fetched, Phase, SlotConfig, SlotEvent,
    SlotSnapshot, Status,
};
pub use retry::{Backoff, RetryPolicy};
pub use sheets::{SheetClient, SheetConfig, SheetSource, TableData};
