//! # Ledger Errors
//!
//! The caller-facing error taxonomy. Everything the engine or the store can
//! raise is folded into one of these variants, each with a stable code.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► LedgerError ──► ErrorResponse     │
//! │                        DbError ──┘        │            { code, message }│
//! │                                           │                             │
//! │                                           └── error! for internal       │
//! │                                               failures, message kept    │
//! │                                               generic for callers       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//! `InvalidAmount`, `InsufficientStock`, `OwnerNotFound` and `Validation`
//! are raised while planning, before any write is issued. `StoreUnavailable`
//! and `Conflict` come back from the store.

use serde::Serialize;
use thiserror::Error;

use ombor_core::{CoreError, EntityKind, StockShortage, ValidationError};
use ombor_db::DbError;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger operation errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    // =========================================================================
    // Rejected before any write
    // =========================================================================
    /// Non-positive, negative or overflowing monetary input.
    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// A sale asks for more than the warehouse holds.
    #[error("Insufficient stock: {}", describe_shortages(.shortages))]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// Referenced factory, customer or product does not exist.
    #[error("{entity} not found: {id}")]
    OwnerNotFound { entity: EntityKind, id: String },

    /// Field-level input error.
    #[error("Validation error: {0}")]
    Validation(String),

    // =========================================================================
    // Store failures
    // =========================================================================
    /// The store failed or timed out.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Another writer changed the same debt or stock figure, and retries ran out.
    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Setup and bugs
    // =========================================================================
    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected failure (malformed data, query errors).
    #[error("Internal error: {0}")]
    Internal(String),
}

fn describe_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Machine-readable error codes.
///
/// ## Serialization
/// Serialized as SCREAMING_SNAKE_CASE, e.g. `"INSUFFICIENT_STOCK"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidAmount,
    InsufficientStock,
    OwnerNotFound,
    ValidationError,
    StoreUnavailable,
    Conflict,
    InvalidConfig,
    Internal,
}

/// Serializable form of an error for a UI or API boundary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl LedgerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LedgerError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            LedgerError::InsufficientStock { .. } => ErrorCode::InsufficientStock,
            LedgerError::OwnerNotFound { .. } => ErrorCode::OwnerNotFound,
            LedgerError::Validation(_) => ErrorCode::ValidationError,
            LedgerError::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            LedgerError::Conflict(_) => ErrorCode::Conflict,
            LedgerError::InvalidConfig(_) => ErrorCode::InvalidConfig,
            LedgerError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Creates an OwnerNotFound error.
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        LedgerError::OwnerNotFound {
            entity,
            id: id.into(),
        }
    }

    /// True when the same call may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_) | LedgerError::Conflict(_))
    }

    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            // Internal details stay in the logs
            LedgerError::Internal(_) => "Ledger operation failed".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            code: self.code(),
            message,
        }
    }
}

/// Maps a collection name back to the entity it holds.
fn entity_for_collection(collection: &str) -> Option<EntityKind> {
    match collection {
        "factories" => Some(EntityKind::Factory),
        "customers" => Some(EntityKind::Customer),
        "products" => Some(EntityKind::Product),
        _ => None,
    }
}

/// Converts core errors to ledger errors.
impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidAmount { field, reason } => LedgerError::InvalidAmount { field, reason },
            CoreError::InsufficientStock { shortages } => LedgerError::InsufficientStock { shortages },
            CoreError::OwnerNotFound { entity, id } => LedgerError::OwnerNotFound { entity, id },
            CoreError::Validation(e) => LedgerError::Validation(e.to_string()),
        }
    }
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Validation(err.to_string())
    }
}

/// Converts store errors to ledger errors.
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { collection, id } => match entity_for_collection(&collection) {
                Some(entity) => LedgerError::OwnerNotFound { entity, id },
                None => {
                    tracing::error!(%collection, %id, "Missing document");
                    LedgerError::Internal(format!("{} document not found: {}", collection, id))
                }
            },
            e @ DbError::Duplicate { .. } => LedgerError::Conflict(e.to_string()),
            e @ DbError::Conflict { .. } => LedgerError::Conflict(e.to_string()),
            DbError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
            DbError::ConnectionFailed(msg) => LedgerError::StoreUnavailable(msg),
            e @ DbError::Malformed { .. } => {
                tracing::error!("Malformed document: {}", e);
                LedgerError::Internal(e.to_string())
            }
            e @ (DbError::MigrationFailed(_)
            | DbError::QueryFailed(_)
            | DbError::Serialization(_)) => {
                tracing::error!("Store operation failed: {}", e);
                LedgerError::Internal(e.to_string())
            }
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::InvalidConfig(err.to_string())
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::InvalidConfig(err.to_string())
    }
}
