//! # ombor-core: Pure Ledger Logic for Ombor
//!
//! This crate is the **heart** of Ombor. It decides how factory and customer
//! debts move when goods are bought, sold and paid for. Everything here is a
//! pure function with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Ombor Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Presentation Layer (external)                   │   │
//! │  │   Buy form ──► Sell form ──► Pay debt ──► Dashboard / Details   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ombor-ledger (Ledger service)                   │   │
//! │  │   record_purchase, record_sale, record_*_payment, reconcile    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ombor-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │ reconcile │  │   │
//! │  │   │  Product  │  │   Money   │  │ obligation│  │  replay   │  │   │
//! │  │   │  Factory  │  │  checked  │  │  payment  │  │  drift    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO NETWORK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 ombor-db (Ledger Store layer)                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, Factory, Customer, Purchase, Sale, Payment)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Field-level input validation
//! - [`ledger`] - The Ledger Engine: obligation, payment, sale and purchase rules
//! - [`reconcile`] - Debt replay from the transaction log, drift detection
//! - [`stats`] - Dashboard numbers and the monthly revenue report
//! - [`views`] - Name search, kind and day filters used by list/detail views
//!
//! ## Example Usage
//!
//! ```rust
//! use ombor_core::ledger::record_obligation;
//! use ombor_core::Money;
//!
//! // Purchase worth 1000, paid 600 now, factory owed nothing before
//! let outcome = record_obligation(Money::zero(), Money::new(1000), Money::new(600)).unwrap();
//! assert_eq!(outcome.debt_left, Money::new(400));
//! assert_eq!(outcome.new_debt, Money::new(400));
//! ```

pub mod error;
pub mod ledger;
pub mod money;
pub mod reconcile;
pub mod stats;
pub mod types;
pub mod validation;
pub mod views;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, EntityKind, StockShortage, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a display name (product, factory, customer).
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length of a free-form text field (phone, address, location, note).
pub const MAX_TEXT_LEN: usize = 500;

/// Maximum number of line items in a single sale.
///
/// ## Business Reason
/// Prevents runaway checkouts. A wholesale order rarely has more than a
/// few dozen distinct products.
pub const MAX_SALE_LINES: usize = 100;
