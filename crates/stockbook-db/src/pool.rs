//! # Database Pool Management
//!
//! Connection pool creation, configuration, and the transaction scope every
//! compound write runs inside.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::from_env() / DbConfig::new(path)                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ├── catalog()  ─► ProductCatalog  (reads)                        │
//! │       ├── ledger()   ─► LedgerStore     (reads)                        │
//! │       ├── users()    ─► UserDirectory                                  │
//! │       │                                                                 │
//! │       └── in_transaction(label, work)                                  │
//! │              │                                                          │
//! │              ├── BEGIN                                                  │
//! │              ├── work(&mut conn)   bounded by operation_timeout         │
//! │              ├── Ok      → COMMIT                                       │
//! │              └── Err / timeout → ROLLBACK                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## SQLite Settings
//! - WAL journal: readers don't block the writer
//! - `synchronous = NORMAL`
//! - `foreign_keys = ON`: the ledger's CASCADE / SET NULL rules depend on it

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::catalog::ProductCatalog;
use crate::repository::ledger::LedgerStore;
use crate::repository::users::UserDirectory;

/// Environment variable overriding the database file path.
pub const ENV_DB_PATH: &str = "STOCKBOOK_DB_PATH";
/// Environment variable overriding the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "STOCKBOOK_MAX_CONNECTIONS";
/// Environment variable overriding the transaction timeout, in milliseconds.
pub const ENV_OP_TIMEOUT_MS: &str = "STOCKBOOK_OP_TIMEOUT_MS";

const DEFAULT_DB_PATH: &str = "./stockbook.db";

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/stockbook.db")
///     .max_connections(5)
///     .operation_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections open.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Upper bound on one transaction body, from BEGIN to COMMIT.
    /// Default: 5 seconds
    pub operation_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// ## Arguments
    /// * `path` - Path to the SQLite database file. Will be created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            operation_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Builds a configuration from `STOCKBOOK_*` environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `STOCKBOOK_DB_PATH` | `./stockbook.db` |
    /// | `STOCKBOOK_MAX_CONNECTIONS` | 5 |
    /// | `STOCKBOOK_OP_TIMEOUT_MS` | 5000 |
    pub fn from_env() -> DbResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> DbResult<Self> {
        let path = lookup(ENV_DB_PATH).unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let mut config = DbConfig::new(path);

        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            let max: u32 = raw
                .trim()
                .parse()
                .map_err(|_| DbError::InvalidConfig(format!("{ENV_MAX_CONNECTIONS}={raw}")))?;
            if max == 0 {
                return Err(DbError::InvalidConfig(format!("{ENV_MAX_CONNECTIONS}=0")));
            }
            config = config.max_connections(max);
        }

        if let Some(raw) = lookup(ENV_OP_TIMEOUT_MS) {
            let millis: u64 = raw
                .trim()
                .parse()
                .map_err(|_| DbError::InvalidConfig(format!("{ENV_OP_TIMEOUT_MS}={raw}")))?;
            config = config.operation_timeout(Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self.min_connections = self.min_connections.min(max);
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the transaction timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// A single connection that is never recycled, since closing it would
    /// discard the database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            operation_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Transaction Scope
// =============================================================================

/// Future returned by a transaction body, borrowing the transaction's
/// connection for `'c`.
pub type ScopedFuture<'c, T> = Pin<Box<dyn Future<Output = DbResult<T>> + Send + 'c>>;

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cheap to clone; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Bound on each transaction body.
    operation_timeout: Duration,

    /// Serialises compound writes. Shared by every clone and every
    /// Coordinator built over this pool.
    writer: Arc<Mutex<()>>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Enables WAL, NORMAL synchronous and foreign keys
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    ///
    /// ## Returns
    /// * `Ok(Database)` - Ready-to-use database handle
    /// * `Err(DbError)` - Connection or migration failed
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_url = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", config.database_path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            operation_timeout_ms = config.operation_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database {
            pool,
            operation_timeout: config.operation_timeout,
            writer: Arc::new(Mutex::new(())),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The bound applied to each transaction body.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Returns a handle with a different transaction timeout, sharing the pool.
    pub fn with_operation_timeout(&self, timeout: Duration) -> Self {
        Database {
            pool: self.pool.clone(),
            operation_timeout: timeout,
            writer: Arc::clone(&self.writer),
        }
    }

    /// Takes the writer lock, waiting for any compound write in progress.
    pub(crate) async fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }

    /// Returns the product catalog.
    pub fn catalog(&self) -> ProductCatalog {
        ProductCatalog::new(self.pool.clone())
    }

    /// Returns the restock and sale ledger.
    pub fn ledger(&self) -> LedgerStore {
        LedgerStore::new(self.pool.clone())
    }

    /// Returns the user directory.
    pub fn users(&self) -> UserDirectory {
        UserDirectory::new(self.pool.clone())
    }

    /// Runs `work` inside one database transaction.
    ///
    /// ## Guarantees
    /// ```text
    /// work returns Ok          → COMMIT, value returned
    /// work returns Err         → ROLLBACK, error returned unchanged
    /// operation_timeout passes → body dropped, ROLLBACK, DbError::Timeout
    /// commit itself fails      → SQLite discards the transaction
    /// ```
    /// Every statement the body runs must use the connection it is handed;
    /// anything run on the pool is outside the transaction.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let id = db
    ///     .in_transaction("append_restock", move |conn| {
    ///         Box::pin(async move { LedgerStore::append_restock_event(conn, at, &lines).await })
    ///     })
    ///     .await?;
    /// ```
    pub async fn in_transaction<T, F>(&self, label: &str, work: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> ScopedFuture<'c, T> + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(label, "Transaction started");

        let outcome = tokio::time::timeout(self.operation_timeout, work(&mut *tx)).await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(|e| {
                    error!(label, error = %e, "Commit failed");
                    DbError::TransactionFailed(e.to_string())
                })?;
                debug!(label, "Transaction committed");
                Ok(value)
            }
            Ok(Err(err)) => {
                warn!(label, error = %err, "Rolling back transaction");
                rollback(tx, label).await;
                Err(err)
            }
            Err(_) => {
                let millis = self.operation_timeout.as_millis();
                warn!(label, timeout_ms = millis as u64, "Transaction timed out, rolling back");
                rollback(tx, label).await;
                Err(DbError::Timeout {
                    operation: label.to_string(),
                    millis,
                })
            }
        }
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Sqlite>, label: &str) {
    // A failed explicit rollback still leaves the transaction uncommitted;
    // the connection is reset when it returns to the pool.
    if let Err(e) = tx.rollback().await {
        error!(label, error = %e, "Rollback failed");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
