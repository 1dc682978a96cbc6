//! # Error Types
//!
//! Domain-specific error types for ombor-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ombor-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  ombor-db errors (separate crate)                                      │
//! │  └── DbError          - Store operation failures                       │
//! │                                                                         │
//! │  ombor-ledger errors                                                   │
//! │  └── LedgerError      - What the presentation layer sees               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every ledger validation error is raised before a single write is planned.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Entity Kind
// =============================================================================

/// Which kind of record an id was expected to resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Factory,
    Customer,
    Product,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Factory => write!(f, "Factory"),
            EntityKind::Customer => write!(f, "Customer"),
            EntityKind::Product => write!(f, "Product"),
        }
    }
}

// =============================================================================
// Stock Shortage
// =============================================================================

/// One product that cannot cover the quantity requested by a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockShortage {
    pub product_id: String,
    pub name: String,
    pub available: i64,
    pub requested: i64,
}

impl fmt::Display for StockShortage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (available {}, requested {})",
            self.name, self.available, self.requested
        )
    }
}

fn list_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
///
/// These map one-to-one onto the caller-facing taxonomy: `InvalidAmount`,
/// `InsufficientStock` and `OwnerNotFound`. `StoreUnavailable` only exists
/// once a store is involved, so it lives in the ledger crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A monetary input is non-positive where it must be positive, negative
    /// where it must be non-negative, or overflowed.
    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// One or more sale lines ask for more than the warehouse holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Checkout {flour: 3, oil: 10}
    ///      │
    ///      ▼
    /// Check stock: flour=5 ✓, oil=4 ✗
    ///      │
    ///      ▼
    /// InsufficientStock { shortages: [oil (available 4, requested 10)] }
    ///      │
    ///      ▼
    /// Nothing written, both quantities unchanged
    /// ```
    #[error("Insufficient stock: {}", list_shortages(.shortages))]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// Referenced factory, customer or product id does not resolve.
    #[error("{entity} not found: {id}")]
    OwnerNotFound { entity: EntityKind, id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidAmount error for a named field.
    pub fn invalid_amount(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidAmount {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an OwnerNotFound error.
    pub fn not_found(entity: EntityKind, id: impl Into<String>) -> Self {
        CoreError::OwnerNotFound {
            entity,
            id: id.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before ledger rules run.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, unknown product kind).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
