//! # stockbook-core: Pure Business Logic for Stockbook
//!
//! This crate holds the rules that keep stock levels, restock history and
//! sale history consistent with each other. Everything here is a pure
//! function or a plain data type; the database and the coordinator that
//! commits changes atomically live in `stockbook-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockbook Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  UI layer (outside this workspace)              │   │
//! │  │    Catalog table ──► Sale form ──► Restock form ──► History     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ SaleRequest / RestockRequest           │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            stockbook-db: Coordinator (single writer)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ validates with                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockbook-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │   types   │  │   money   │  │ validation │  │  access  │  │   │
//! │  │   │  Product  │  │   Money   │  │ line rules │  │   Role   │  │   │
//! │  │   │  Ledger   │  │  half-up  │  │  payment   │  │ Operation│  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Product, ledger events/lines, request and response DTOs
//! - [`money`] - Integer-cent money with half-up decimal conversion
//! - [`error`] - Validation error taxonomy
//! - [`validation`] - Line, payment and product field checks
//! - [`access`] - Static role → operation permission table
//!
//! ## Example Usage
//!
//! ```rust
//! use std::str::FromStr;
//! use rust_decimal::Decimal;
//! use stockbook_core::money::Money;
//!
//! let unit = Decimal::from_str("9.99").unwrap();
//! let total = Money::round_half_up(unit * Decimal::from(3)).unwrap();
//! assert_eq!(total.cents(), 2997);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod access;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use access::{can_perform, Operation, Role};
pub use error::{ValidationError, ValidationKind, Violation, Violations};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines accepted in a single sale or restock request.
///
/// ## Business Reason
/// Guards against runaway requests from a misbehaving UI; a till receipt
/// never gets anywhere near this.
pub const MAX_REQUEST_LINES: usize = 200;
