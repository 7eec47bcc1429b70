//! Per-database connection pool registry.
//!
//! One PostgreSQL server hosts many databases, and a PostgreSQL connection is
//! bound to a single database for its whole life. The registry therefore keeps
//! one pool per database name, created lazily on first use and closed only at
//! shutdown.
//!
//! # Design Decisions
//!
//! - **`OnceCell` per database name**: single-flight pool creation, so
//!   concurrent first requests for the same database open exactly one pool
//! - **Failed creation leaves no entry**: the empty cell is removed, and the
//!   next request retries with a fresh cell
//! - **`AtomicBool` closed flag**: checked before and after creation, so a pool
//!   finishing its creation during shutdown is closed instead of handed out
//! - **`AtomicUsize` lease count**: maintained by [`LeasedConnection`] guards,
//!   reported when pools are drained
//!
//! # Concurrency Safety
//!
//! - The map lock is never held across pool creation or pool closing
//! - Pool metadata is only mutated here and in the lease guard, never by a
//!   running statement

use crate::db::connector::{PgConnector, PoolConnector};
use crate::db::lease::LeasedConnection;
use crate::error::{DbError, DbResult};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A pool bound to exactly one database.
///
/// Cheap to clone: clones share the pool and its lease counter.
#[derive(Clone)]
pub struct ManagedPool {
    inner: Arc<ManagedPoolInner>,
}

struct ManagedPoolInner {
    database: String,
    pool: PgPool,
    created_at: Instant,
    /// Count of outstanding leases. Decremented by the lease guard.
    active_leases: AtomicUsize,
}

impl ManagedPool {
    pub fn new(database: impl Into<String>, pool: PgPool) -> Self {
        Self {
            inner: Arc::new(ManagedPoolInner {
                database: database.into(),
                pool,
                created_at: Instant::now(),
                active_leases: AtomicUsize::new(0),
            }),
        }
    }

    /// Database every connection of this pool targets. Fixed at creation.
    pub fn database(&self) -> &str {
        &self.inner.database
    }

    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    pub fn max_connections(&self) -> u32 {
        self.inner.pool.options().get_max_connections()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    pub fn age(&self) -> Duration {
        self.inner.created_at.elapsed()
    }

    /// Number of connections currently leased out through this handle.
    pub fn active_leases(&self) -> usize {
        self.inner.active_leases.load(Ordering::Acquire)
    }

    /// True when both handles refer to the same pool instance.
    pub fn same_pool(&self, other: &ManagedPool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Check out one connection, waiting at most the pool's acquire timeout.
    pub async fn lease(&self) -> DbResult<LeasedConnection> {
        let conn = self.inner.pool.acquire().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DbError::pool_exhausted(
                self.database(),
                self.inner.pool.options().get_acquire_timeout().as_secs(),
            ),
            sqlx::Error::PoolClosed => DbError::RegistryClosed,
            other => DbError::connection(
                format!(
                    "Failed to lease a connection to '{}': {}",
                    self.database(),
                    other
                ),
                "Check that the PostgreSQL server is reachable",
            ),
        })?;

        self.inner.active_leases.fetch_add(1, Ordering::AcqRel);
        Ok(LeasedConnection::new(conn, self.clone()))
    }

    /// Decrement the lease count. Saturates at 0 to survive extra releases.
    pub(crate) fn release_lease(&self) {
        let result =
            self.inner
                .active_leases
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                    Some(count.saturating_sub(1))
                });

        if let Ok(0) = result {
            warn!(
                database = %self.database(),
                "Lease count underflow detected - extra release call"
            );
        }
    }

    /// Close the pool, waiting up to `grace` for leased connections to return.
    ///
    /// The pool is marked closed immediately; connections still leased after
    /// the grace period are closed when their guard drops.
    pub async fn close(&self, grace: Duration) {
        debug!(
            database = %self.database(),
            age_secs = self.age().as_secs(),
            "Closing pool"
        );
        if timeout(grace, self.inner.pool.close()).await.is_err() {
            warn!(
                database = %self.database(),
                active_leases = self.active_leases(),
                grace_secs = grace.as_secs(),
                "Grace period elapsed with connections still leased"
            );
        }
    }
}

impl std::fmt::Debug for ManagedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedPool")
            .field("database", &self.inner.database)
            .field("closed", &self.is_closed())
            .field("active_leases", &self.active_leases())
            .field("created_at", &self.inner.created_at)
            .finish()
    }
}

/// Lazily-populated map from database name to its pool.
pub struct PoolRegistry<C: PoolConnector = PgConnector> {
    connector: C,
    default_database: String,
    shutdown_grace: Duration,
    /// Per-database lazy pools. OnceCell ensures single-flight creation.
    pools: RwLock<HashMap<String, Arc<OnceCell<ManagedPool>>>>,
    closed: AtomicBool,
}

impl<C: PoolConnector> PoolRegistry<C> {
    pub fn new(connector: C, default_database: impl Into<String>, shutdown_grace: Duration) -> Self {
        Self {
            connector,
            default_database: default_database.into(),
            shutdown_grace,
            pools: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Database used when a caller passes an empty name.
    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Get the pool for `database`, creating it on first use.
    ///
    /// An empty name resolves to the default database. Names are
    /// case-sensitive. Never returns a closed pool.
    pub async fn get_or_create_pool(&self, database: &str) -> DbResult<ManagedPool> {
        let name = if database.is_empty() {
            self.default_database.as_str()
        } else {
            database
        };

        if self.is_closed() {
            return Err(DbError::RegistryClosed);
        }

        // Get or create the OnceCell for this name
        let cell = {
            let pools = self.pools.read().await;
            if let Some(cell) = pools.get(name) {
                Arc::clone(cell)
            } else {
                drop(pools);
                let mut pools = self.pools.write().await;
                // Shutdown sets `closed` before draining, so a check under the
                // write lock cannot leave an entry behind a finished drain.
                if self.is_closed() {
                    return Err(DbError::RegistryClosed);
                }
                Arc::clone(
                    pools
                        .entry(name.to_string())
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let result = cell
            .get_or_try_init(|| async {
                debug!(database = %name, "Creating new database pool");
                let pool = self.connector.connect(name).await?;
                info!(database = %name, "Database pool created");
                Ok::<_, DbError>(ManagedPool::new(name, pool))
            })
            .await;

        match result {
            Ok(pool) => {
                if self.is_closed() || pool.is_closed() {
                    // Creation raced with shutdown: the drain may have missed this pool.
                    pool.close(self.shutdown_grace).await;
                    return Err(DbError::RegistryClosed);
                }
                Ok(pool.clone())
            }
            Err(e) => {
                self.discard_failed(name, &cell).await;
                Err(e)
            }
        }
    }

    /// Remove `cell` if it is still the registered, uninitialized cell for `name`.
    async fn discard_failed(&self, name: &str, cell: &Arc<OnceCell<ManagedPool>>) {
        let mut pools = self.pools.write().await;
        let stale = pools
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            pools.remove(name);
            debug!(database = %name, "Discarded failed pool entry");
        }
    }

    /// Get the number of live pools (initialized cells).
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|cell| cell.initialized()).count()
    }

    /// Check whether a live pool exists for `database`.
    pub async fn contains(&self, database: &str) -> bool {
        let pools = self.pools.read().await;
        pools.get(database).is_some_and(|cell| cell.initialized())
    }

    /// Close every pool and refuse further requests. Idempotent.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Pool registry already closed");
            return;
        }

        // Drain under lock, close outside lock
        let drained: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };

        for (database, cell) in drained {
            if let Some(pool) = cell.get() {
                info!(
                    database = %database,
                    active_leases = pool.active_leases(),
                    "Closing database pool"
                );
                pool.close(self.shutdown_grace).await;
            }
        }

        info!("All database pools closed");
    }
}

impl<C: PoolConnector> std::fmt::Debug for PoolRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("default_database", &self.default_database)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
