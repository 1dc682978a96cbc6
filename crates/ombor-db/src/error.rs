//! # Store Error Types
//!
//! Error types for Ledger Store and repository operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / serde_json::Error / injected fault                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  LedgerError (ombor-ledger) ← Caller-facing taxonomy + ErrorCode       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Ledger Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Document does not exist.
    ///
    /// ## When This Occurs
    /// - Patching an id that was never created
    /// - `Repository::require` on a missing id
    #[error("{collection} document not found: {id}")]
    NotFound { collection: String, id: String },

    /// A create hit an id that already exists.
    ///
    /// ## When This Occurs
    /// - Replaying an intent whose idempotency key is already recorded
    /// - Re-applying a create that already landed
    #[error("{collection} document already exists: {id}")]
    Duplicate { collection: String, id: String },

    /// A guarded patch found a different value than it expected.
    ///
    /// ## When This Occurs
    /// - Two writers updated the same debt or stock figure at once
    #[error("Conflict on {collection}/{id}: {field} expected {expected}, found {actual}")]
    Conflict {
        collection: String,
        id: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// The store cannot be reached, timed out, or refused the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored document failed typed decoding.
    #[error("Malformed {collection} document {id}: {reason}")]
    Malformed {
        collection: String,
        id: String,
        reason: String,
    },

    /// Store connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A document body could not be encoded or parsed as JSON.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl DbError {
    /// Creates a NotFound error.
    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Creates a Duplicate error.
    pub fn duplicate(collection: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Duplicate {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// True for failures where retrying later may succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, DbError::Unavailable(_) | DbError::ConnectionFailed(_))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::PoolTimedOut   → DbError::Unavailable
/// sqlx::Error::PoolClosed     → DbError::Unavailable
/// sqlx::Error::Io             → DbError::Unavailable
/// sqlx::Error::Database       → busy/locked → Unavailable, else QueryFailed
/// Other                       → DbError::QueryFailed
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::Unavailable("connection pool timed out".to_string()),

            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::Unavailable(e.to_string()),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Unavailable(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            _ => DbError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;
