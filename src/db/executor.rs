//! Transactional execution engine.
//!
//! Every statement runs inside its own transaction on a freshly leased
//! connection:
//!
//! 1. lease a connection from the target database's pool
//! 2. `BEGIN TRANSACTION READ ONLY` or `BEGIN`, depending on the mode
//! 3. run the caller's SQL exactly once
//! 4. `COMMIT` on success, `ROLLBACK` on any failure
//!
//! The lease guard returns the connection on every exit path, including
//! cancellation of the returned future.

use crate::db::registry::ManagedPool;
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_STATEMENT_TIMEOUT_SECS, QueryResult, TransactionMode};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Executes one statement per transaction against a [`ManagedPool`].
#[derive(Debug, Clone)]
pub struct TransactionalExecutor {
    statement_timeout: Duration,
}

impl TransactionalExecutor {
    /// Create a new executor with the default statement timeout.
    pub fn new() -> Self {
        Self {
            statement_timeout: Duration::from_secs(DEFAULT_STATEMENT_TIMEOUT_SECS),
        }
    }

    /// Create a new executor bounding each round trip by `statement_timeout`.
    pub fn with_timeout(statement_timeout: Duration) -> Self {
        Self { statement_timeout }
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Execute `sql` in a transaction of the given mode and commit it.
    ///
    /// On failure the transaction is rolled back and the original error is
    /// returned; a failing ROLLBACK is logged but never replaces it. No partial
    /// result is ever returned alongside an error.
    pub async fn execute(
        &self,
        pool: &ManagedPool,
        sql: &str,
        mode: TransactionMode,
    ) -> DbResult<QueryResult> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("SQL statement cannot be empty"));
        }

        let start = Instant::now();
        debug!(
            database = %pool.database(),
            mode = %mode,
            sql = %sql,
            timeout_secs = self.statement_timeout.as_secs(),
            "Executing statement"
        );

        let mut lease = pool.lease().await?;

        let outcome = async {
            lease.begin(mode, self.statement_timeout).await?;
            let result = lease.fetch(sql, self.statement_timeout).await?;
            lease.commit(self.statement_timeout).await?;
            Ok::<_, DbError>(result)
        }
        .await;

        match outcome {
            Ok(result) => {
                debug!(
                    database = %pool.database(),
                    mode = %mode,
                    row_count = result.row_count,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Statement committed"
                );
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = lease.rollback(self.statement_timeout).await {
                    warn!(
                        database = %pool.database(),
                        error = %rollback_err,
                        original_error = %e,
                        "Rollback failed; connection will be discarded"
                    );
                }
                debug!(
                    database = %pool.database(),
                    mode = %mode,
                    kind = e.kind(),
                    error = %e,
                    "Statement rolled back"
                );
                Err(e)
            }
        }
    }
}

impl Default for TransactionalExecutor {
    fn default() -> Self {
        Self::new()
    }
}
