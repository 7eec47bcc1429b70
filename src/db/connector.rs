//! Pool construction.
//!
//! The registry never builds pools itself: it asks a [`PoolConnector`] for a
//! pool bound to one database name. Production code uses [`PgConnector`];
//! tests substitute connectors that count or fail.

use crate::config::PoolOptions;
use crate::error::{DbError, DbResult};
use crate::models::ConnectionConfig;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Builds a connection pool for a single target database.
pub trait PoolConnector: Send + Sync + 'static {
    /// Create a pool whose connections all target `database`.
    ///
    /// Must fail with [`DbError::Connection`] when the engine rejects the
    /// parameters, so the caller never caches an unusable pool.
    fn connect(&self, database: &str) -> impl Future<Output = DbResult<PgPool>> + Send;
}

/// Connector that opens real PostgreSQL pools with sqlx.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: ConnectionConfig,
    pool_options: PoolOptions,
}

impl PgConnector {
    pub fn new(config: ConnectionConfig, pool_options: PoolOptions) -> Self {
        Self {
            config,
            pool_options,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn pool_options(&self) -> &PoolOptions {
        &self.pool_options
    }

    /// sqlx pool builder carrying the configured tunables.
    fn pool_builder(&self) -> PgPoolOptions {
        let opts = &self.pool_options;
        PgPoolOptions::new()
            .min_connections(opts.min_connections_or_default())
            .max_connections(opts.max_connections_or_default())
            .acquire_timeout(Duration::from_secs(opts.acquire_timeout_or_default()))
            .idle_timeout(Some(Duration::from_secs(opts.idle_timeout_or_default())))
            .test_before_acquire(opts.test_before_acquire_or_default())
    }
}

impl PoolConnector for PgConnector {
    async fn connect(&self, database: &str) -> DbResult<PgPool> {
        debug!(
            database = %database,
            url = %self.config.masked_url(database),
            "Opening database pool"
        );

        // Eager connect: bad credentials or an unknown database fail here,
        // not on the first lease.
        self.pool_builder()
            .connect_with(self.config.connect_options(database))
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to connect to database '{}': {}", database, e),
                    connection_suggestion(database, &e),
                )
            })
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(database: &str, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("does not exist") {
        return format!(
            "Check that the database '{}' exists; use db-list-databases to see available names",
            database
        );
    }

    if error_str.contains("connection refused") {
        return "Check that the PostgreSQL server is running and accessible".to_string();
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the database user and password".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    "Verify the host, port and credentials of the PostgreSQL server".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(pool_options: PoolOptions) -> PgConnector {
        let config =
            ConnectionConfig::new("localhost", 5432, "app", "pw", "postgres", "public").unwrap();
        PgConnector::new(config, pool_options)
    }

    #[test]
    fn test_pool_builder_uses_defaults() {
        let builder = connector(PoolOptions::default()).pool_builder();
        assert_eq!(builder.get_max_connections(), 10);
        assert_eq!(builder.get_min_connections(), 0);
        assert_eq!(builder.get_acquire_timeout(), Duration::from_secs(30));
        assert_eq!(builder.get_idle_timeout(), Some(Duration::from_secs(600)));
        assert!(builder.get_test_before_acquire());
    }

    #[test]
    fn test_pool_builder_uses_overrides() {
        let builder = connector(PoolOptions {
            max_connections: Some(3),
            acquire_timeout_secs: Some(2),
            test_before_acquire: Some(false),
            ..PoolOptions::default()
        })
        .pool_builder();
        assert_eq!(builder.get_max_connections(), 3);
        assert_eq!(builder.get_acquire_timeout(), Duration::from_secs(2));
        assert!(!builder.get_test_before_acquire());
    }

    #[test]
    fn test_connection_suggestion_unknown_database() {
        let err = sqlx::Error::Configuration("database \"nope\" does not exist".into());
        let suggestion = connection_suggestion("nope", &err);
        assert!(suggestion.contains("'nope'"));
        assert!(suggestion.contains("db-list-databases"));
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let suggestion = connection_suggestion("postgres", &sqlx::Error::Io(io));
        assert!(suggestion.contains("running"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_is_connection_error() {
        let config = ConnectionConfig::new("127.0.0.1", 1, "app", "", "postgres", "public").unwrap();
        let connector = PgConnector::new(
            config,
            PoolOptions {
                acquire_timeout_secs: Some(2),
                ..PoolOptions::default()
            },
        );
        let result = connector.connect("postgres").await;
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }
}
