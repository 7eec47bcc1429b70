//! Listing resources.
//!
//! `postgres://list-databases` and `postgres://list-tables` expose the same
//! catalog listings as the `db-list-*` tools, always against the default
//! database. Reading one returns a JSON text entry per row, addressed by the
//! row's locator.

use crate::db::catalog;
use crate::db::{DbClient, locate, locate_database};
use crate::error::{DbError, DbResult};
use rmcp::model::{AnnotateAble, RawResource, ReadResourceResult, Resource, ResourceContents};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::info;

pub const DATABASES_RESOURCE_URI: &str = "postgres://list-databases";
pub const TABLES_RESOURCE_URI: &str = "postgres://list-tables";

const JSON_MIME_TYPE: &str = "application/json";

/// One of the fixed listing resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingResource {
    Databases,
    Tables,
}

impl ListingResource {
    pub const ALL: [ListingResource; 2] = [ListingResource::Databases, ListingResource::Tables];

    /// Resolve a resource URI. Matching is exact.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            DATABASES_RESOURCE_URI => Some(Self::Databases),
            TABLES_RESOURCE_URI => Some(Self::Tables),
            _ => None,
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Self::Databases => DATABASES_RESOURCE_URI,
            Self::Tables => TABLES_RESOURCE_URI,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Databases => "db-resources-list-databases",
            Self::Tables => "db-resources-list-tables",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Self::Databases => "Non-template databases available on the PostgreSQL host",
            Self::Tables => "Tables of the configured schema in the default database",
        }
    }

    /// Resource descriptor advertised by `resources/list`.
    pub fn descriptor(self) -> Resource {
        let mut raw = RawResource::new(self.uri(), self.name());
        raw.description = Some(self.description().to_string());
        raw.mime_type = Some(JSON_MIME_TYPE.to_string());
        raw.no_annotation()
    }
}

pub struct ResourceHandler {
    client: Arc<DbClient>,
}

impl ResourceHandler {
    pub fn new(client: Arc<DbClient>) -> Self {
        Self { client }
    }

    pub fn list(&self) -> Vec<Resource> {
        ListingResource::ALL
            .into_iter()
            .map(ListingResource::descriptor)
            .collect()
    }

    pub async fn read(&self, resource: ListingResource) -> DbResult<ReadResourceResult> {
        let result = match resource {
            ListingResource::Databases => self.client.list_databases(None).await?,
            ListingResource::Tables => self.client.list_tables(None).await?,
        };

        let contents = result
            .rows
            .iter()
            .map(|row| {
                let uri = self.row_locator(resource, row);
                let text = serde_json::to_string_pretty(row).map_err(|e| {
                    DbError::internal(format!("Failed to serialize resource row: {e}"))
                })?;
                Ok(ResourceContents::text(text, uri))
            })
            .collect::<DbResult<Vec<_>>>()?;

        info!(
            resource = resource.uri(),
            count = contents.len(),
            "Read listing resource"
        );

        Ok(ReadResourceResult { contents })
    }

    /// Locator for a listed row; rows without the name column fall back to the listing URI.
    fn row_locator(&self, resource: ListingResource, row: &Map<String, JsonValue>) -> String {
        let column = match resource {
            ListingResource::Databases => catalog::DATABASE_NAME_COLUMN,
            ListingResource::Tables => catalog::TABLE_NAME_COLUMN,
        };
        match (resource, row.get(column).and_then(JsonValue::as_str)) {
            (ListingResource::Databases, Some(name)) => locate_database(name),
            (ListingResource::Tables, Some(name)) => locate(
                self.client.default_database(),
                self.client.schema_name(),
                name,
            ),
            (_, None) => resource.uri().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::models::ConnectionConfig;
    use serde_json::json;
    use std::time::Duration;

    fn handler() -> ResourceHandler {
        let config =
            ConnectionConfig::new("127.0.0.1", 1, "app", "", "main", "crm").unwrap();
        let client = DbClient::from_config(
            config,
            PoolOptions::default(),
            Duration::from_secs(5),
            Duration::from_secs(1),
        );
        ResourceHandler::new(Arc::new(client))
    }

    #[test]
    fn test_from_uri() {
        assert_eq!(
            ListingResource::from_uri("postgres://list-databases"),
            Some(ListingResource::Databases)
        );
        assert_eq!(
            ListingResource::from_uri("postgres://list-tables"),
            Some(ListingResource::Tables)
        );
        assert_eq!(ListingResource::from_uri("postgres://list-views"), None);
        assert_eq!(ListingResource::from_uri("POSTGRES://LIST-TABLES"), None);
    }

    #[test]
    fn test_list_advertises_both_resources() {
        let resources = handler().list();
        let uris: Vec<_> = resources.iter().map(|r| r.raw.uri.as_str()).collect();
        assert_eq!(uris, vec![DATABASES_RESOURCE_URI, TABLES_RESOURCE_URI]);
        assert!(
            resources
                .iter()
                .all(|r| r.raw.mime_type.as_deref() == Some(JSON_MIME_TYPE))
        );
    }

    #[test]
    fn test_row_locators() {
        let handler = handler();
        let db_row = json!({"datname": "sales"}).as_object().unwrap().clone();
        assert_eq!(
            handler.row_locator(ListingResource::Databases, &db_row),
            "postgres://sales"
        );

        let table_row = json!({"table_name": "orders"}).as_object().unwrap().clone();
        assert_eq!(
            handler.row_locator(ListingResource::Tables, &table_row),
            "postgres://main/orders/crm"
        );
    }

    #[test]
    fn test_row_locator_without_name_column() {
        let handler = handler();
        let row = json!({"other": 1}).as_object().unwrap().clone();
        assert_eq!(
            handler.row_locator(ListingResource::Tables, &row),
            TABLES_RESOURCE_URI
        );
    }
}
