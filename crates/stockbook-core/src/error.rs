//! # Error Types
//!
//! Validation error taxonomy for stockbook-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  stockbook-core errors (this file)                                     │
//! │  ├── ValidationError  - One broken business rule, with context         │
//! │  ├── ValidationKind   - Field-less discriminant of the above           │
//! │  └── Violations       - Every broken rule in one request               │
//! │                                                                         │
//! │  stockbook-db errors (separate crate)                                  │
//! │  ├── DbError          - Database operation failures                    │
//! │  └── StockError       - What the UI layer receives from Coordinator    │
//! │                                                                         │
//! │  Flow: ValidationError → Violations → StockError::Rejected → UI        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, amounts)
//! 3. Validation never stops at the first failure; callers collect
//!    [`Violation`]s so the user can fix a whole request in one pass

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Validation Error
// =============================================================================

/// A broken business rule.
///
/// Raised before any mutation is attempted. Storage-level constraint
/// failures that correspond to one of these rules are translated into the
/// matching [`ValidationKind`] by the database crate.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Quantity on a restock or sale line is zero or negative.
    #[error("quantity must be positive, got {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Selling more units than the product has on hand.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line (qty: 15)
    ///      │
    ///      ▼
    /// Check stock: available=10
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: 1, available: 10, requested: 15 }
    ///      │
    ///      ▼
    /// UI shows: "Only 10 in stock"
    /// ```
    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: i64,
        available: i64,
        requested: i64,
    },

    /// The referenced product does not exist (never created, or deleted).
    #[error("product {product_id} does not exist")]
    MissingProduct { product_id: i64 },

    /// A product field is empty or negative.
    #[error("product field '{field}' is missing or invalid")]
    IncompleteProductFields { field: String },

    /// Tendered payment does not cover the sale total.
    #[error("payment {payment} does not cover total {total}")]
    InsufficientPayment { total: Money, payment: Money },

    /// A stock adjustment would leave the product below zero.
    #[error("stock for product {product_id} cannot go negative ({current} {delta:+})")]
    NegativeStock {
        product_id: i64,
        current: i64,
        delta: i64,
    },

    /// A monetary amount is negative or too large to represent in cents.
    #[error("{field} has an invalid amount: {value}")]
    InvalidAmount { field: String, value: String },

    /// The request carries no lines.
    #[error("request has no lines")]
    EmptyRequest,

    /// The request carries more lines than one operation accepts.
    #[error("request has more than {max} lines")]
    TooManyLines { max: usize },
}

impl ValidationError {
    /// Returns the field-less kind of this error.
    pub fn kind(&self) -> ValidationKind {
        match self {
            ValidationError::InvalidQuantity { .. } => ValidationKind::InvalidQuantity,
            ValidationError::InsufficientStock { .. } => ValidationKind::InsufficientStock,
            ValidationError::MissingProduct { .. } => ValidationKind::MissingProduct,
            ValidationError::IncompleteProductFields { .. } => {
                ValidationKind::IncompleteProductFields
            }
            ValidationError::InsufficientPayment { .. } => ValidationKind::InsufficientPayment,
            ValidationError::NegativeStock { .. } => ValidationKind::NegativeStock,
            ValidationError::InvalidAmount { .. } => ValidationKind::InvalidAmount,
            ValidationError::EmptyRequest | ValidationError::TooManyLines { .. } => {
                ValidationKind::MalformedRequest
            }
        }
    }

    /// Shorthand for an [`ValidationError::IncompleteProductFields`] error.
    pub fn incomplete(field: impl Into<String>) -> Self {
        ValidationError::IncompleteProductFields {
            field: field.into(),
        }
    }
}

/// Discriminant of [`ValidationError`] without context.
///
/// Used where only the rule matters, e.g. when a storage constraint is
/// mapped back onto the business rule it enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    InvalidQuantity,
    InsufficientStock,
    MissingProduct,
    IncompleteProductFields,
    InsufficientPayment,
    NegativeStock,
    InvalidAmount,
    MalformedRequest,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationKind::InvalidQuantity => "invalid quantity",
            ValidationKind::InsufficientStock => "insufficient stock",
            ValidationKind::MissingProduct => "missing product",
            ValidationKind::IncompleteProductFields => "incomplete product fields",
            ValidationKind::InsufficientPayment => "insufficient payment",
            ValidationKind::NegativeStock => "negative stock",
            ValidationKind::InvalidAmount => "invalid amount",
            ValidationKind::MalformedRequest => "malformed request",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Violations
// =============================================================================

/// A validation error pinned to the request line that caused it.
///
/// `line` is the zero-based index into the request's lines, or `None` for
/// request-level problems such as insufficient payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Violation {
    pub line: Option<usize>,
    pub error: ValidationError,
}

impl Violation {
    /// A violation raised by one request line.
    pub fn at_line(line: usize, error: ValidationError) -> Self {
        Violation {
            line: Some(line),
            error,
        }
    }

    /// A violation raised by the request as a whole.
    pub fn request(error: ValidationError) -> Self {
        Violation { line: None, error }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line + 1, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Every rule a request broke, in line order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Violations(Vec::new())
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// Kinds of all violations, in order.
    pub fn kinds(&self) -> Vec<ValidationKind> {
        self.0.iter().map(|v| v.error.kind()).collect()
    }

    /// Returns `Ok(())` when nothing was collected, otherwise the list.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn into_inner(self) -> Vec<Violation> {
        self.0
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", violation)?;
        }
        Ok(())
    }
}

impl From<Vec<Violation>> for Violations {
    fn from(violations: Vec<Violation>) -> Self {
        Violations(violations)
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
