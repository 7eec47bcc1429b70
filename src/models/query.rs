//! Query-related data models.
//!
//! This module defines the transaction mode a statement runs under and the
//! normalized result returned to callers.

use serde::Serialize;
use serde_json::Value as JsonValue;

/// Default statement timeout in seconds.
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Transaction mode for a single execution.
///
/// Both modes commit on success. `ReadOnly` asks the engine to reject any
/// mutating statement inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    /// Statement that opens the transaction for this mode.
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Self::ReadOnly => "BEGIN TRANSACTION READ ONLY",
            Self::ReadWrite => "BEGIN",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Result of a committed execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    /// Rows in engine order, each keyed by column name.
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows returned or affected, as reported by the engine's command tags.
    pub row_count: u64,
}

impl QueryResult {
    pub fn new(rows: Vec<serde_json::Map<String, JsonValue>>, row_count: u64) -> Self {
        Self { rows, row_count }
    }

    /// Values of a single column, skipping rows where it is missing or not a string.
    pub fn string_column(&self, column: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(|value| value.as_str().map(String::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_begin_statement() {
        assert_eq!(
            TransactionMode::ReadOnly.begin_statement(),
            "BEGIN TRANSACTION READ ONLY"
        );
        assert_eq!(TransactionMode::ReadWrite.begin_statement(), "BEGIN");
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(TransactionMode::ReadOnly.to_string(), "read-only");
        assert_eq!(TransactionMode::ReadWrite.to_string(), "read-write");
        assert!(TransactionMode::ReadOnly.is_read_only());
        assert!(!TransactionMode::ReadWrite.is_read_only());
    }

    #[test]
    fn test_string_column() {
        let rows = vec![
            json!({"datname": "sales"}).as_object().unwrap().clone(),
            json!({"datname": null}).as_object().unwrap().clone(),
            json!({"other": "x"}).as_object().unwrap().clone(),
            json!({"datname": "orders"}).as_object().unwrap().clone(),
        ];
        let result = QueryResult::new(rows, 4);
        assert_eq!(result.string_column("datname"), vec!["sales", "orders"]);
    }

    #[test]
    fn test_result_serialization() {
        let rows = vec![json!({"n": 1}).as_object().unwrap().clone()];
        let json = serde_json::to_string(&QueryResult::new(rows, 1)).unwrap();
        assert_eq!(json, r#"{"rows":[{"n":1}],"row_count":1}"#);
    }
}
