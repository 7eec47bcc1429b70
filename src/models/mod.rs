//! Data models for the PostgreSQL MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

pub use connection::{ConnectionConfig, ConnectionConfigError, DEFAULT_PORT};
pub use query::{DEFAULT_STATEMENT_TIMEOUT_SECS, QueryResult, TransactionMode};
