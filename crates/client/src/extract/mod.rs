//! Content extraction from raw sheet data.
//!
//! The weekly content lives in the first data row, under the first header
//! that matches one of the configured column names.
//!
//! ### Algorithm
//! - Row 0 is the header row; row 1 is the first data row.
//! - A header matches when its lowercase text contains any configured name,
//!   lowercased. The first matching header in column order wins.
//! - The cell is trimmed and must be at least `min_content_length` characters.
//!
//! Extraction is pure: the same table and options always yield the same result.

use serde::{Deserialize, Serialize};
use sheetnews_core::{AppConfig, Error};

use crate::sheets::TableData;

const DEFAULT_CONTENT_COLUMNS: [&str; 5] = ["content", "summary", "digest", "text", "description"];

/// Extraction settings. Part of the cache key, hence `Serialize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Header substrings identifying the content column (default: content,
    /// summary, digest, text, description).
    pub content_columns: Vec<String>,

    /// Minimum trimmed length in characters (default: 20).
    pub min_content_length: usize,

    /// Require a header row and at least one data row (default: true).
    pub require_headers: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            content_columns: DEFAULT_CONTENT_COLUMNS.into_iter().map(String::from).collect(),
            min_content_length: 20,
            require_headers: true,
        }
    }
}

impl ExtractOptions {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            content_columns: config.content_columns.clone(),
            min_content_length: config.min_content_length,
            require_headers: config.require_headers,
        }
    }
}

/// Text payload derived from a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Trimmed cell text.
    pub text: String,
    /// Header the text was taken from.
    pub source_column: String,
    /// Total rows in the source table, headers included.
    pub row_count: usize,
    pub headers: Vec<String>,
}

/// Derive the content payload from `table`.
///
/// # Errors
///
/// `PARSING_ERROR` when the table has no usable rows, no matching header or an
/// empty content cell; `VALIDATION_ERROR` when the trimmed text is too short,
/// including a cell of only whitespace.
pub fn extract_content(table: &TableData, options: &ExtractOptions) -> Result<ExtractedContent, Error> {
    let Some(rows) = table.rows.as_ref() else {
        return Err(Error::parsing("No data found in the sheet. Make sure your sheet has content."));
    };

    if rows.is_empty() {
        return Err(Error::parsing("Sheet is empty. Make sure your sheet has content."));
    }

    if options.require_headers && rows.len() < 2 {
        return Err(Error::parsing(
            "Sheet only has headers. Make sure there is data in the rows below the headers.",
        ));
    }

    let headers = &rows[0];
    let Some(index) = find_content_column(headers, &options.content_columns) else {
        return Err(Error::parsing(format!(
            "Content column not found. Available columns: {}. Looking for columns containing: {}",
            headers.join(", "),
            options.content_columns.join(", ")
        )));
    };
    let column = &headers[index];

    let cell = rows.get(1).and_then(|row| row.get(index)).map(String::as_str).unwrap_or_default();
    if cell.is_empty() {
        return Err(Error::parsing(format!("No content found in the first data row at column \"{column}\"")));
    }

    let text = cell.trim();

    let length = text.chars().count();
    if length < options.min_content_length {
        return Err(Error::validation(format!(
            "Content too short ({length} characters). Expected at least {} characters.",
            options.min_content_length
        )));
    }

    tracing::debug!(column = %column, length, rows = rows.len(), "extracted sheet content");

    Ok(ExtractedContent {
        text: text.to_string(),
        source_column: column.clone(),
        row_count: rows.len(),
        headers: headers.clone(),
    })
}

fn find_content_column(headers: &[String], columns: &[String]) -> Option<usize> {
    let needles: Vec<String> = columns.iter().filter(|c| !c.is_empty()).map(|c| c.to_lowercase()).collect();
    headers.iter().position(|header| {
        let header = header.to_lowercase();
        !header.is_empty() && needles.iter().any(|needle| header.contains(needle.as_str()))
    })
}
