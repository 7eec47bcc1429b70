//! PostgreSQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI assistants
//! to query PostgreSQL databases, with one lazily created connection pool per
//! target database and every statement run inside its own transaction.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::DbClient;
pub use error::{DbError, DbResult};
pub use mcp::DbService;
