//! Catalog listing queries.
//!
//! Both listings run through the regular read-only execution path; this module
//! only owns the SQL text and the extraction of names from the result.

use crate::models::QueryResult;

/// Column holding the database name in [`LIST_DATABASES`] results.
pub const DATABASE_NAME_COLUMN: &str = "datname";

/// Column holding the table name in [`list_tables_sql`] results.
pub const TABLE_NAME_COLUMN: &str = "table_name";

/// Non-template databases of the server.
pub const LIST_DATABASES: &str = "SELECT datname FROM pg_database WHERE datistemplate = false";

/// Tables of `schema_name` in the current database.
///
/// The schema name is embedded as a string literal with `'` doubled; the
/// execution path sends SQL text without bind parameters.
pub fn list_tables_sql(schema_name: &str) -> String {
    format!(
        "SELECT table_name FROM information_schema.tables WHERE table_schema = {}",
        quote_literal(schema_name)
    )
}

/// Quote `value` as a standard-conforming SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Database names from a [`LIST_DATABASES`] result.
pub fn database_names(result: &QueryResult) -> Vec<String> {
    result.string_column(DATABASE_NAME_COLUMN)
}

/// Table names from a [`list_tables_sql`] result.
pub fn table_names(result: &QueryResult) -> Vec<String> {
    result.string_column(TABLE_NAME_COLUMN)
}
