//! Query entry point shared by every tool and resource.
//!
//! `DbClient` resolves the target database, fetches its pool from the
//! registry and hands it to the executor.

use crate::config::PoolOptions;
use crate::db::catalog;
use crate::db::connector::{PgConnector, PoolConnector};
use crate::db::executor::TransactionalExecutor;
use crate::db::registry::PoolRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, QueryResult, TransactionMode};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct DbClient<C: PoolConnector = PgConnector> {
    registry: Arc<PoolRegistry<C>>,
    executor: TransactionalExecutor,
    schema_name: String,
}

impl DbClient<PgConnector> {
    /// Build a client backed by real PostgreSQL pools.
    ///
    /// No connection is opened here; the first request for a database opens
    /// its pool.
    pub fn from_config(
        config: ConnectionConfig,
        pool_options: PoolOptions,
        statement_timeout: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        let schema_name = config.schema_name().to_string();
        let default_database = config.default_database().to_string();
        let connector = PgConnector::new(config, pool_options);
        Self::new(
            Arc::new(PoolRegistry::new(connector, default_database, shutdown_grace)),
            TransactionalExecutor::with_timeout(statement_timeout),
            schema_name,
        )
    }
}

impl<C: PoolConnector> DbClient<C> {
    pub fn new(
        registry: Arc<PoolRegistry<C>>,
        executor: TransactionalExecutor,
        schema_name: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            schema_name: schema_name.into(),
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry<C>> {
        &self.registry
    }

    pub fn executor(&self) -> &TransactionalExecutor {
        &self.executor
    }

    /// Schema used for table listing.
    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    pub fn default_database(&self) -> &str {
        self.registry.default_database()
    }

    /// Database a request will run against: absent or empty means the default.
    pub fn resolve_target<'a>(&'a self, target: Option<&'a str>) -> &'a str {
        match target {
            Some(name) if !name.is_empty() => name,
            _ => self.default_database(),
        }
    }

    /// Run `sql` against `target` (or the default database) in `mode`.
    pub async fn query(
        &self,
        target: Option<&str>,
        sql: &str,
        mode: TransactionMode,
    ) -> DbResult<QueryResult> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("SQL statement cannot be empty"));
        }
        let database = self.resolve_target(target);
        let pool = self.registry.get_or_create_pool(database).await?;
        self.executor.execute(&pool, sql, mode).await
    }

    /// Non-template databases on the server, queried through `target`.
    pub async fn list_databases(&self, target: Option<&str>) -> DbResult<QueryResult> {
        self.query(target, catalog::LIST_DATABASES, TransactionMode::ReadOnly)
            .await
    }

    /// Tables of the configured schema in `target`.
    pub async fn list_tables(&self, target: Option<&str>) -> DbResult<QueryResult> {
        let sql = catalog::list_tables_sql(&self.schema_name);
        self.query(target, &sql, TransactionMode::ReadOnly).await
    }

    /// Close every pool. Further queries fail with `RegistryClosed`.
    pub async fn shutdown(&self) {
        info!("Closing all database connections");
        self.registry.shutdown().await;
    }
}

impl<C: PoolConnector> std::fmt::Debug for DbClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("registry", &self.registry)
            .field("executor", &self.executor)
            .field("schema_name", &self.schema_name)
            .finish()
    }
}
