//! Integration tests for the MCP tool handlers and listing resources.
//!
//! Set TEST_DATABASE_URL to run these against a live PostgreSQL server.

use pg_mcp_server::config::PoolOptions;
use pg_mcp_server::db::DbClient;
use pg_mcp_server::error::DbError;
use pg_mcp_server::models::{ConnectionConfig, TransactionMode};
use pg_mcp_server::tools::query::{QueryInput, QueryToolHandler};
use pg_mcp_server::tools::resources::{ListingResource, ResourceHandler};
use pg_mcp_server::tools::schema::{ListInput, SchemaToolHandler};
use rmcp::model::ResourceContents;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn test_client() -> Option<Arc<DbClient>> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return None;
        }
    };

    let config = ConnectionConfig::from_url(&url, "information_schema").unwrap();
    Some(Arc::new(DbClient::from_config(
        config,
        PoolOptions::default(),
        Duration::from_secs(30),
        Duration::from_secs(2),
    )))
}

#[tokio::test]
async fn test_readonly_query_tool() {
    let Some(client) = test_client() else {
        return;
    };
    let handler = QueryToolHandler::new(client.clone());

    let output = handler
        .query(
            QueryInput {
                database_name: Some("  ".to_string()),
                sql_query: "SELECT 'a' AS letter UNION ALL SELECT 'b'".to_string(),
            },
            TransactionMode::ReadOnly,
        )
        .await
        .unwrap();

    assert_eq!(output.row_count, 2);
    assert_eq!(output.query_result[0]["letter"], json!("a"));
    assert_eq!(output.query_result[1]["letter"], json!("b"));
    assert_eq!(
        output.executed_query,
        "SELECT 'a' AS letter UNION ALL SELECT 'b'"
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_readonly_tool_maps_to_invalid_params() {
    let Some(client) = test_client() else {
        return;
    };
    let handler = QueryToolHandler::new(client.clone());

    let err = handler
        .query(
            QueryInput {
                database_name: None,
                sql_query: "CREATE TABLE pg_mcp_tool_readonly_check (id int)".to_string(),
            },
            TransactionMode::ReadOnly,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Statement { .. }));

    let mcp_error = rmcp::ErrorData::from(err);
    assert_eq!(mcp_error.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    assert!(mcp_error.message.contains("25006"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_list_databases_tool() {
    let Some(client) = test_client() else {
        return;
    };
    let handler = SchemaToolHandler::new(client.clone());

    let output = handler.list_databases(ListInput::default()).await.unwrap();
    let names: Vec<_> = output
        .query_result
        .iter()
        .filter_map(|row| row["datname"].as_str())
        .collect();

    assert!(names.contains(&client.default_database()));
    assert!(!names.contains(&"template0"));
    assert!(!names.contains(&"template1"));
    assert!(output.executed_query.contains("pg_database"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_list_tables_tool() {
    let Some(client) = test_client() else {
        return;
    };
    let handler = SchemaToolHandler::new(client.clone());

    // information_schema always holds tables such as sql_features.
    let output = handler
        .list_tables(ListInput {
            database_name: Some(client.default_database().to_string()),
        })
        .await
        .unwrap();
    assert!(
        output
            .query_result
            .iter()
            .any(|row| row["table_name"] == json!("sql_features"))
    );
    assert!(output.executed_query.ends_with("'information_schema'"));

    client.shutdown().await;
}

#[tokio::test]
async fn test_read_database_resource() {
    let Some(client) = test_client() else {
        return;
    };
    let handler = ResourceHandler::new(client.clone());

    let result = handler.read(ListingResource::Databases).await.unwrap();
    assert!(!result.contents.is_empty());

    let expected_uri = format!("postgres://{}", client.default_database());
    let found = result.contents.iter().any(|content| match content {
        ResourceContents::TextResourceContents { uri, text, .. } => {
            uri == &expected_uri && text.contains("datname")
        }
        _ => false,
    });
    assert!(found, "default database missing from resource contents");

    client.shutdown().await;
}
