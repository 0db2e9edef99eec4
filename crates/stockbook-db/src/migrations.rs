//! # Database Migrations
//!
//! Embedded SQL migrations for the catalog, ledger and user tables.
//!
//! ```text
//! Database::new(config)
//!      │
//!      ▼
//! _sqlx_migrations exists?  ── no ──► create it
//!      │
//!      ▼
//! 001_initial_schema.sql   ✓ applied  /  ⬜ pending → run, record checksum
//! ```
//!
//! ## Adding New Migrations
//! 1. Create `migrations/sqlite/NNN_description.sql` with the next number
//! 2. **NEVER** modify an applied migration; add a new one

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Migrations from `migrations/sqlite/`, embedded at compile time.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending migrations in filename order. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!(
        embedded = MIGRATOR.migrations.len(),
        "Checking for pending migrations"
    );

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(embedded, applied)` migration counts, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((MIGRATOR.migrations.len(), applied.max(0) as usize))
}
