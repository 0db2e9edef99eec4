//! # Repository Module
//!
//! SQL for the catalog, the ledger and the user directory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Coordinator                                                            │
//! │       │  inside Database::in_transaction(conn)                          │
//! │       │                                                                 │
//! │       ├── ProductCatalog::adjust_quantity(conn, id, delta)             │
//! │       └── LedgerStore::append_sale_event(conn, at, totals, lines)      │
//! │                                                                         │
//! │  Readers                                                                │
//! │       ├── db.catalog().list()                                          │
//! │       ├── db.ledger().list_sale_events()                               │
//! │       └── db.users().authenticate(name, password)                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads are methods on a repository holding the pool. Writes that belong
//! to a compound operation are associated functions taking the transaction
//! connection, and are visible only inside this crate.
//!
//! - [`ProductCatalog`](catalog::ProductCatalog) - current stock per product
//! - [`LedgerStore`](ledger::LedgerStore) - restock and sale history
//! - [`UserDirectory`](users::UserDirectory) - credentials and roles

pub mod catalog;
pub mod ledger;
pub mod users;
