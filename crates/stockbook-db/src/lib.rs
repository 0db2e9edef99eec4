//! # stockbook-db: Persistence and Coordination for Stockbook
//!
//! SQLite storage for the product catalog, the restock/sale ledger and user
//! accounts, plus the [`Coordinator`] that applies restocks and sales
//! atomically.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Data Flow                              │
//! │                                                                         │
//! │  UI layer: "Sell 3 × Cola, paid 30.00"                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockbook-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌──────────────────┐ │   │
//! │  │   │  Coordinator  │──►│  Repositories │   │    Migrations    │ │   │
//! │  │   │ writer lock   │   │ ProductCatalog│   │    (embedded)    │ │   │
//! │  │   │ validate →    │   │ LedgerStore   │   │ 001_initial_...  │ │   │
//! │  │   │ commit/abort  │   │ UserDirectory │   │                  │ │   │
//! │  │   └───────┬───────┘   └───────┬───────┘   └──────────────────┘ │   │
//! │  │           │  in_transaction   │                                 │   │
//! │  │           ▼                   ▼                                 │   │
//! │  │   ┌─────────────────────────────────────────────────────────┐  │   │
//! │  │   │              Database (pool.rs, SqlitePool)             │  │   │
//! │  │   └─────────────────────────────────────────────────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Configuration, connection pool, transaction scope
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database and coordinator error types
//! - [`repository`] - Catalog, ledger and user SQL
//! - [`coordinator`] - Atomic restock and sale operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockbook_db::{Coordinator, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//! let coordinator = Coordinator::new(db);
//!
//! let outcome = coordinator.apply_sale(EventTime::now(), &request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod coordinator;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use coordinator::Coordinator;
pub use error::{CommitFailure, ConstraintKind, DbError, DbResult, StockError, StockResult};
pub use pool::{Database, DbConfig};

pub use repository::catalog::ProductCatalog;
pub use repository::ledger::LedgerStore;
pub use repository::users::{User, UserDirectory};
