//! Values endpoint response types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw tabular data returned by the values endpoint.
///
/// Rows are row-major and may have different lengths. Row 0 is conventionally
/// the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    /// Range echoed back by the API, e.g. `Sheet1!A1:Z1000`.
    #[serde(default)]
    pub range: Option<String>,

    #[serde(default, rename = "values", deserialize_with = "lenient_rows")]
    pub rows: Option<Vec<Vec<String>>>,
}

impl TableData {
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let rows = rows.into_iter().map(|row| row.into_iter().map(Into::into).collect()).collect();
        Self { range: None, rows: Some(rows) }
    }

    pub fn row_count(&self) -> usize {
        self.rows.as_ref().map_or(0, Vec::len)
    }
}

/// Accept any JSON scalar as a cell; `null` becomes an empty cell.
fn lenient_rows<'de, D>(deserializer: D) -> Result<Option<Vec<Vec<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Vec<Value>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|rows| rows.into_iter().map(|row| row.into_iter().map(cell_text).collect()).collect()))
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Error envelope returned with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ApiErrorBody {
    /// Decode an error body, falling back to an empty envelope.
    pub fn parse(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or_default()
    }

    pub fn message(&self) -> Option<&str> {
        self.error.as_ref().and_then(|e| e.message.as_deref()).filter(|m| !m.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_values() {
        let json = r#"{
            "range": "Sheet1!A1:Z1000",
            "majorDimension": "ROWS",
            "values": [["Week", "Content"], ["42", "Rust 2024 edition ships"]]
        }"#;
        let table: TableData = serde_json::from_str(json).unwrap();
        assert_eq!(table.range.as_deref(), Some("Sheet1!A1:Z1000"));
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows.unwrap()[1][1], "Rust 2024 edition ships");
    }

    #[test]
    fn test_decode_without_values() {
        let table: TableData = serde_json::from_str(r#"{"range": "Sheet1!A1:A1"}"#).unwrap();
        assert!(table.rows.is_none());
        assert_eq!(table.row_count(), 0);
    }

    #[test]
    fn test_decode_non_string_cells() {
        let table: TableData = serde_json::from_str(r#"{"values": [["a", 1, true, null]]}"#).unwrap();
        assert_eq!(table.rows.unwrap()[0], vec!["a", "1", "true", ""]);
    }

    #[test]
    fn test_ragged_rows() {
        let table: TableData = serde_json::from_str(r#"{"values": [["a", "b", "c"], ["x"]]}"#).unwrap();
        let rows = table.rows.unwrap();
        assert_eq!(rows[0].len(), 3);
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn test_error_body() {
        let body =
            ApiErrorBody::parse(br#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#);
        assert_eq!(body.message(), Some("Quota exceeded"));

        let body = ApiErrorBody::parse(b"<html>oops</html>");
        assert_eq!(body.message(), None);
    }
}
