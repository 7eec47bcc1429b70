//! Database access layer.
//!
//! This module provides database access functionality:
//! - Per-database pool registry with single-flight creation
//! - Scoped connection leases that always roll back and release
//! - Transactional statement execution
//! - Row decoding, catalog listing and resource locators

pub mod catalog;
pub mod client;
pub mod connector;
pub mod executor;
pub mod lease;
pub mod locator;
pub mod registry;
pub mod types;

pub use client::DbClient;
pub use connector::{PgConnector, PoolConnector};
pub use executor::TransactionalExecutor;
pub use lease::{LeaseState, LeasedConnection};
pub use locator::{locate, locate_database};
pub use registry::{ManagedPool, PoolRegistry};
pub use types::RowToJson;
