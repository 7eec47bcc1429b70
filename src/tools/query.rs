//! Query execution tools.
//!
//! This module implements the `db-readonly-query` and `db-write-query` MCP
//! tools. Both run the caller's SQL exactly once in its own transaction; the
//! read-only variant opens the transaction `READ ONLY`, so PostgreSQL itself
//! rejects any mutation.

use crate::db::DbClient;
use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, TransactionMode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

/// Input for the query tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryInput {
    /// Database to run against. Omit to use the server's default database.
    #[serde(default)]
    pub database_name: Option<String>,
    /// A single SQL statement to execute.
    pub sql_query: String,
}

/// Output from the query tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryOutput {
    /// Result rows as column name to value maps, in engine order
    pub query_result: Vec<serde_json::Map<String, JsonValue>>,
    /// Rows returned or affected, summed over all statements
    pub row_count: u64,
    /// The SQL exactly as it was executed
    pub executed_query: String,
}

impl QueryOutput {
    pub fn from_result(result: QueryResult, executed_query: impl Into<String>) -> Self {
        Self {
            query_result: result.rows,
            row_count: result.row_count,
            executed_query: executed_query.into(),
        }
    }
}

/// Trim a caller-supplied database name; blank means "use the default".
pub fn normalize_database(database_name: Option<&str>) -> Option<&str> {
    database_name.map(str::trim).filter(|name| !name.is_empty())
}

pub struct QueryToolHandler {
    client: Arc<DbClient>,
}

impl QueryToolHandler {
    /// Create a new query tool handler.
    pub fn new(client: Arc<DbClient>) -> Self {
        Self { client }
    }

    /// Handle a query tool call in the given transaction mode.
    pub async fn query(&self, input: QueryInput, mode: TransactionMode) -> DbResult<QueryOutput> {
        if input.sql_query.trim().is_empty() {
            return Err(DbError::invalid_input(
                "sqlQuery is required and cannot be blank",
            ));
        }

        let database = normalize_database(input.database_name.as_deref());
        let result = self.client.query(database, &input.sql_query, mode).await?;

        info!(
            database = %self.client.resolve_target(database),
            mode = %mode,
            row_count = result.row_count,
            "Query executed"
        );

        Ok(QueryOutput::from_result(result, input.sql_query))
    }
}
