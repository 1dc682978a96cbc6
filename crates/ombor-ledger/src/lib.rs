//! # ombor-ledger: Ledger Service for Ombor
//!
//! Connects the Ledger Engine (`ombor-core`) to the Ledger Store
//! (`ombor-db`). Every purchase, sale and payment runs through one
//! transaction path here that keeps stock and running debts consistent.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ledger Service                                   │
//! │                                                                         │
//! │   caller (UI, seed, tests)                                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         Ledger                                    │  │
//! │  │                                                                  │  │
//! │  │  owners       create factories / customers                       │  │
//! │  │  catalog      add / edit products                                │  │
//! │  │  transactions purchase, sale, factory + customer payments        │  │
//! │  │  reports      dashboard, monthly revenue, owner detail, search   │  │
//! │  │  maintenance  reconcile, correct drift, recover, prune           │  │
//! │  └──────────┬──────────────────────────────┬────────────────────────┘  │
//! │             │ plan                         │ commit                     │
//! │             ▼                              ▼                            │
//! │  ┌────────────────────┐       ┌─────────────────────────────────────┐  │
//! │  │ ombor-core         │       │ ombor-db                            │  │
//! │  │ Ledger Engine      │       │ LedgerStore (memory / SQLite)       │  │
//! │  │ (pure)             │       │ + intents (write-ahead, idempotent) │  │
//! │  └────────────────────┘       └─────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - TOML + environment configuration
//! - [`telemetry`] - `tracing` subscriber setup
//! - [`error`] - Caller-facing error taxonomy
//! - [`clock`] - Record timestamps
//! - [`intent`] - Intent log and idempotent batch replay
//! - [`service`] - The `Ledger` and its operations
//!
//! ## Usage
//! ```rust,ignore
//! use ombor_ledger::{Ledger, LedgerConfig, NewFactory, NewPayment};
//!
//! let config = LedgerConfig::load(None)?;
//! ombor_ledger::telemetry::init_tracing(&config.logging);
//! let ledger = Ledger::open(&config).await?;
//!
//! let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await?;
//! let receipt = ledger
//!     .record_factory_payment(NewPayment::full(&factory.id).with_key("pay-001"))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;
pub mod intent;
pub mod service;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LedgerConfig, LedgerSettings, LogSettings, StoreBackend, StoreSettings};
pub use error::{ErrorCode, ErrorResponse, LedgerError, LedgerResult};
pub use intent::{Intent, IntentKind, IntentStatus};
pub use service::catalog::{ProductDraft, ProductEdit};
pub use service::maintenance::{ReconciliationReport, RecoveryReport};
pub use service::owners::{NewCustomer, NewFactory};
pub use service::reports::{CustomerDetail, FactoryDetail, OwnerDetail};
pub use service::transactions::{NewPayment, PurchaseProduct, PurchaseRequest, SaleRequest};
pub use service::{DebtOwner, Ledger, Receipt};
