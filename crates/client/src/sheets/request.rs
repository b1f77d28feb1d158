//! Request validation and URL construction for the values endpoint.

use url::Url;
use sheetnews_core::Error;

/// Shortest API key accepted before any network call is made.
pub const MIN_API_KEY_LEN: usize = 20;

/// A validated read of one range from one spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesRequest<'a> {
    pub api_key: &'a str,
    pub sheet_id: &'a str,
    pub range: &'a str,
}

impl<'a> ValuesRequest<'a> {
    /// Validate the request parameters.
    ///
    /// Empty strings count as missing.
    pub fn new(api_key: &'a str, sheet_id: &'a str, range: &'a str) -> Result<Self, Error> {
        if api_key.is_empty() {
            return Err(Error::invalid_api_key(
                "Google API key not found. Set SHEETNEWS_API_KEY or api_key in the config file.",
            ));
        }

        if sheet_id.is_empty() {
            return Err(Error::validation("Sheet ID is required"));
        }

        if api_key.chars().count() < MIN_API_KEY_LEN {
            return Err(Error::invalid_api_key("Invalid API key format"));
        }

        if range.trim().is_empty() {
            return Err(Error::validation("Sheet range is required"));
        }

        Ok(Self { api_key, sheet_id, range })
    }

    /// Build `{base_url}/{sheet_id}/values/{range}?key={api_key}`.
    ///
    /// Path segments are percent-encoded, so sheet ids and ranges are never
    /// interpreted as extra path components.
    pub fn url(&self, base_url: &str) -> Result<Url, Error> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::validation(format!("Invalid base URL '{base_url}': {e}")).with_cause(e))?;

        url.path_segments_mut()
            .map_err(|_| Error::validation(format!("Base URL '{base_url}' cannot carry a path")))?
            .pop_if_empty()
            .push(self.sheet_id)
            .push("values")
            .push(self.range);

        url.query_pairs_mut().append_pair("key", self.api_key);
        Ok(url)
    }
}

/// First ten characters of the key, for logs.
pub fn redact_key(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(10).collect();
    format!("{prefix}...")
}
