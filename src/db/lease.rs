//! Scoped connection lease.
//!
//! A [`LeasedConnection`] owns one pooled connection for the duration of one
//! execution and returns it on drop, whatever path the execution took. If the
//! owning future is dropped while a transaction is open, the guard rolls the
//! transaction back before the connection goes back to the pool, so no later
//! lease ever observes an open transaction.

use crate::db::registry::ManagedPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, TransactionMode};
use futures_util::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgConnection;
use sqlx::{Either, Executor, Postgres};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Where a lease is in its transaction lifecycle.
///
/// `Leased -> InTransaction -> Committed` on success,
/// `Leased -> InTransaction -> RolledBack` on failure.
/// `Poisoned` marks a connection whose state is unknown (ROLLBACK failed);
/// it is closed instead of returned to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Leased,
    InTransaction,
    Committed,
    RolledBack,
    Poisoned,
}

/// A connection checked out of exactly one [`ManagedPool`].
pub struct LeasedConnection {
    conn: Option<PoolConnection<Postgres>>,
    pool: ManagedPool,
    state: LeaseState,
}

impl LeasedConnection {
    pub(crate) fn new(conn: PoolConnection<Postgres>, pool: ManagedPool) -> Self {
        Self {
            conn: Some(conn),
            pool,
            state: LeaseState::Leased,
        }
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    /// Database the leased connection is bound to.
    pub fn database(&self) -> &str {
        self.pool.database()
    }

    fn conn_mut(&mut self) -> DbResult<&mut PoolConnection<Postgres>> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::internal("Leased connection already released"))
    }

    fn expect_state(&self, expected: LeaseState, operation: &str) -> DbResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DbError::internal(format!(
                "Cannot {} a lease in state {:?}",
                operation, self.state
            )))
        }
    }

    /// Open a transaction in `mode` with a server-side statement timeout.
    ///
    /// The state becomes `InTransaction` before BEGIN is sent, so a lease
    /// dropped mid-BEGIN is still rolled back.
    pub async fn begin(&mut self, mode: TransactionMode, limit: Duration) -> DbResult<()> {
        self.expect_state(LeaseState::Leased, "begin")?;
        self.state = LeaseState::InTransaction;
        debug!(database = %self.database(), mode = %mode, "BEGIN");

        let sql = begin_sql(mode, limit);
        let conn: &mut PgConnection = &mut **self.conn_mut()?;
        bounded("BEGIN", limit, conn.execute(sqlx::raw_sql(&sql)))
            .await
            .map(|_| ())
    }

    /// Run `sql` once inside the open transaction and collect its output.
    ///
    /// The statement goes through the extended query protocol as an unnamed
    /// prepared statement, so the engine accepts exactly one statement and
    /// transaction control text cannot end or alter the surrounding block.
    pub async fn fetch(&mut self, sql: &str, limit: Duration) -> DbResult<QueryResult> {
        self.expect_state(LeaseState::InTransaction, "run a statement on")?;

        let conn: &mut PgConnection = &mut **self.conn_mut()?;
        bounded("statement", limit, async move {
            let mut stream = conn.fetch_many(sqlx::query(sql).persistent(false));
            let mut rows = Vec::new();
            let mut row_count = 0u64;
            while let Some(item) = stream.try_next().await? {
                match item {
                    Either::Left(done) => row_count += done.rows_affected(),
                    Either::Right(row) => rows.push(row.to_json_map()),
                }
            }
            Ok(QueryResult::new(rows, row_count))
        })
        .await
    }

    pub async fn commit(&mut self, limit: Duration) -> DbResult<()> {
        self.expect_state(LeaseState::InTransaction, "commit")?;

        let conn: &mut PgConnection = &mut **self.conn_mut()?;
        bounded("COMMIT", limit, conn.execute(sqlx::raw_sql("COMMIT"))).await?;

        self.state = LeaseState::Committed;
        Ok(())
    }

    /// Roll back the open transaction.
    ///
    /// On failure the lease is poisoned and its connection will be closed
    /// rather than reused.
    pub async fn rollback(&mut self, limit: Duration) -> DbResult<()> {
        self.expect_state(LeaseState::InTransaction, "roll back")?;

        let conn: &mut PgConnection = &mut **self.conn_mut()?;
        let result = bounded("ROLLBACK", limit, conn.execute(sqlx::raw_sql("ROLLBACK")))
            .await
            .map(|_| ());

        self.state = match result {
            Ok(()) => LeaseState::RolledBack,
            Err(_) => LeaseState::Poisoned,
        };
        result
    }
}

/// BEGIN for `mode`, followed by a transaction-scoped `statement_timeout` so
/// the server cancels a statement that outlives `limit`.
pub(crate) fn begin_sql(mode: TransactionMode, limit: Duration) -> String {
    format!(
        "{}; SET LOCAL statement_timeout = {}",
        mode.begin_statement(),
        limit.as_millis().max(1)
    )
}

impl Drop for LeasedConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        match self.state {
            LeaseState::InTransaction => {
                // Owner was cancelled mid-transaction: roll back before release.
                let pool = self.pool.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(rollback_abandoned(conn, pool));
                    }
                    Err(_) => {
                        warn!(
                            database = %pool.database(),
                            "No runtime to roll back abandoned transaction, closing connection"
                        );
                        drop(conn.detach());
                        pool.release_lease();
                    }
                }
            }
            LeaseState::Poisoned => {
                warn!(
                    database = %self.pool.database(),
                    "Closing connection after failed rollback"
                );
                drop(conn.detach());
                self.pool.release_lease();
            }
            LeaseState::Leased | LeaseState::Committed | LeaseState::RolledBack => {
                drop(conn);
                self.pool.release_lease();
            }
        }
    }
}

/// Upper bound for the ROLLBACK of an abandoned lease, including the wait
/// for the interrupted statement's results to drain.
const ABANDONED_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// ROLLBACK on a connection whose owner went away, then release it.
async fn rollback_abandoned(mut conn: PoolConnection<Postgres>, pool: ManagedPool) {
    let result = bounded(
        "ROLLBACK",
        ABANDONED_ROLLBACK_TIMEOUT,
        (&mut *conn).execute(sqlx::raw_sql("ROLLBACK")),
    )
    .await;
    match result {
        Ok(_) => {
            debug!(database = %pool.database(), "Rolled back abandoned transaction");
            drop(conn);
        }
        Err(e) => {
            warn!(
                database = %pool.database(),
                error = %e,
                "Rollback of abandoned transaction failed, closing connection"
            );
            drop(conn.detach());
        }
    }
    pool.release_lease();
}

/// SQLSTATE raised when the server cancels a statement (`query_canceled`).
const QUERY_CANCELED: &str = "57014";

/// Client-side wait past `limit` before giving up on the server's own timeout.
const CLIENT_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

/// Run one round trip, failing with `Timeout` once `limit` elapses.
///
/// The server enforces `limit` through `statement_timeout`; the local timer is
/// a backstop for a server that stops answering.
async fn bounded<T>(
    operation: &str,
    limit: Duration,
    work: impl Future<Output = Result<T, sqlx::Error>>,
) -> DbResult<T> {
    match timeout(limit + CLIENT_TIMEOUT_GRACE, work).await {
        Ok(result) => result.map_err(|e| classify(operation, limit, DbError::from(e))),
        Err(_) => Err(DbError::timeout(operation, limit.as_secs())),
    }
}

/// A statement cancelled by the server's `statement_timeout` is a `Timeout`.
fn classify(operation: &str, limit: Duration, err: DbError) -> DbError {
    let cancelled = matches!(
        &err,
        DbError::Statement { sql_state: Some(code), .. } if code == QUERY_CANCELED
    );
    if cancelled {
        DbError::timeout(operation, limit.as_secs())
    } else {
        err
    }
}
