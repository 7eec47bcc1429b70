//! MCP tool implementations.
//!
//! This module contains the database tool handlers:
//! - `query`: `db-readonly-query` and `db-write-query`
//! - `schema`: `db-list-databases` and `db-list-all-tables`
//! - `resources`: the `postgres://list-*` listing resources

pub mod query;
pub mod resources;
pub mod schema;

pub use query::{QueryInput, QueryOutput, QueryToolHandler};
pub use resources::{ListingResource, ResourceHandler};
pub use schema::{ListInput, SchemaToolHandler};
