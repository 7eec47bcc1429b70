//! Catalog listing tools.
//!
//! This module implements the `db-list-databases` and `db-list-all-tables`
//! MCP tools. Each listing is an ordinary read-only query, so the output has
//! the same shape as the query tools.

use crate::db::DbClient;
use crate::db::catalog;
use crate::error::DbResult;
use crate::tools::query::{QueryOutput, normalize_database};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Input for the listing tools.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListInput {
    /// Database to connect through. Omit to use the server's default database.
    #[serde(default)]
    pub database_name: Option<String>,
}

pub struct SchemaToolHandler {
    client: Arc<DbClient>,
}

impl SchemaToolHandler {
    pub fn new(client: Arc<DbClient>) -> Self {
        Self { client }
    }

    pub async fn list_databases(&self, input: ListInput) -> DbResult<QueryOutput> {
        let database = normalize_database(input.database_name.as_deref());
        let result = self.client.list_databases(database).await?;

        info!(
            database = %self.client.resolve_target(database),
            count = result.rows.len(),
            "Listed databases"
        );
        debug!(databases = ?catalog::database_names(&result));

        Ok(QueryOutput::from_result(result, catalog::LIST_DATABASES))
    }

    pub async fn list_tables(&self, input: ListInput) -> DbResult<QueryOutput> {
        let database = normalize_database(input.database_name.as_deref());
        let result = self.client.list_tables(database).await?;

        info!(
            database = %self.client.resolve_target(database),
            schema = %self.client.schema_name(),
            count = result.rows.len(),
            "Listed tables"
        );
        debug!(tables = ?catalog::table_names(&result));

        Ok(QueryOutput::from_result(
            result,
            catalog::list_tables_sql(self.client.schema_name()),
        ))
    }
}
