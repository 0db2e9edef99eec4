//! # Database Error Types
//!
//! Error types for database operations and for the Coordinator.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← constraint kind read from the driver          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StockError (this module) ← what Coordinator callers see               │
//! │       │                                                                 │
//! │       ├── Rejected(Violations)   nothing was written                   │
//! │       ├── CommitFailed(..)       transaction rolled back               │
//! │       └── NotFound / Forbidden / Storage                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

use stockbook_core::{Operation, Role, ValidationError, ValidationKind, Violations};

// =============================================================================
// Constraint Kind
// =============================================================================

/// Which kind of schema constraint the store rejected a write with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
    Check,
}

impl ConstraintKind {
    /// Classifies a driver error by the kind the driver reports for it.
    fn from_error_kind(kind: ErrorKind) -> Option<Self> {
        match kind {
            ErrorKind::UniqueViolation => Some(ConstraintKind::Unique),
            ErrorKind::ForeignKeyViolation => Some(ConstraintKind::ForeignKey),
            ErrorKind::NotNullViolation => Some(ConstraintKind::NotNull),
            ErrorKind::CheckViolation => Some(ConstraintKind::Check),
            _ => None,
        }
    }

    /// The business rule this constraint enforces, if any.
    ///
    /// ```text
    /// ForeignKey → MissingProduct
    /// NotNull    → IncompleteProductFields
    /// Check      → IncompleteProductFields
    /// Unique     → (none, reported as a persistence failure)
    /// ```
    pub fn business_rule(&self) -> Option<ValidationKind> {
        match self {
            ConstraintKind::ForeignKey => Some(ValidationKind::MissingProduct),
            ConstraintKind::NotNull | ConstraintKind::Check => {
                Some(ValidationKind::IncompleteProductFields)
            }
            ConstraintKind::Unique => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
        };
        f.write_str(name)
    }
}

// =============================================================================
// DbError
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and user feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Product id doesn't exist (never created, or deleted)
    /// - Ledger event id doesn't exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The store rejected a write with a schema constraint.
    ///
    /// ## When This Occurs
    /// - CHECK (quantity >= 0) and friends
    /// - Referencing a product or event that no longer exists
    /// - Duplicate username
    #[error("{kind} constraint violated: {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    /// A stock adjustment would take a product below zero.
    #[error(transparent)]
    Rule(#[from] ValidationError),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Caller-supplied input was rejected before reaching the database.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An environment setting could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction could not begin, commit or roll back.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A transaction body did not finish within the operation timeout.
    #[error("Operation '{operation}' timed out after {millis}ms")]
    Timeout { operation: String, millis: u128 },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// The constraint kind, when this error came from a constraint violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            DbError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → DbError::Constraint when kind() names one
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => match ConstraintKind::from_error_kind(db_err.kind())
            {
                Some(kind) => DbError::Constraint {
                    kind,
                    message: db_err.message().to_string(),
                },
                None => DbError::QueryFailed(db_err.message().to_string()),
            },

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// StockError
// =============================================================================

/// Why a transaction that passed validation still did not commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitFailure {
    /// The store enforced a business rule the validation pass did not catch.
    Rule(ValidationKind),
    /// The transaction body exceeded the operation timeout.
    Timeout,
    /// Any other storage failure.
    Persistence(String),
}

impl fmt::Display for CommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitFailure::Rule(kind) => write!(f, "{}", kind),
            CommitFailure::Timeout => f.write_str("timed out"),
            CommitFailure::Persistence(message) => f.write_str(message),
        }
    }
}

/// Errors returned by the Coordinator.
///
/// Every variant means the catalog and ledger are exactly as they were
/// before the call.
#[derive(Debug, Error)]
pub enum StockError {
    /// Validation failed; nothing was written.
    #[error("request rejected: {0}")]
    Rejected(Violations),

    /// The referenced product or event does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The role may not perform the operation.
    #[error("role '{role}' may not {operation}")]
    Forbidden { role: Role, operation: Operation },

    /// The transaction was rolled back.
    #[error("commit failed: {0}")]
    CommitFailed(CommitFailure),

    /// A read or a non-transactional write failed.
    #[error(transparent)]
    Storage(DbError),
}

impl StockError {
    /// Classifies an error raised inside a rolled-back transaction.
    pub fn commit_failed(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StockError::NotFound { entity, id },
            DbError::Rule(rule) => StockError::CommitFailed(CommitFailure::Rule(rule.kind())),
            DbError::Timeout { .. } => StockError::CommitFailed(CommitFailure::Timeout),
            DbError::Constraint { kind, message } => match kind.business_rule() {
                Some(rule) => StockError::CommitFailed(CommitFailure::Rule(rule)),
                None => StockError::CommitFailed(CommitFailure::Persistence(message)),
            },
            other => StockError::CommitFailed(CommitFailure::Persistence(other.to_string())),
        }
    }

    /// The violations, when the request was rejected by validation.
    pub fn violations(&self) -> Option<&Violations> {
        match self {
            StockError::Rejected(violations) => Some(violations),
            _ => None,
        }
    }
}

impl From<DbError> for StockError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StockError::NotFound { entity, id },
            other => StockError::Storage(other),
        }
    }
}

impl From<Violations> for StockError {
    fn from(violations: Violations) -> Self {
        StockError::Rejected(violations)
    }
}

/// Result type for Coordinator operations.
pub type StockResult<T> = Result<T, StockError>;
