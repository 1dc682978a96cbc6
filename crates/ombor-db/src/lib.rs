//! # ombor-db: Ledger Store Layer for Ombor
//!
//! Every read and write against the Ledger Store goes through this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Ombor Data Flow                                  │
//! │                                                                         │
//! │  Ledger service (record_sale, record_purchase, ...)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ombor-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ Repositories  │    │  Migrations  │  │   │
//! │  │   │               │    │ Repository<T> │    │  (embedded)  │  │   │
//! │  │   │ Arc<dyn       │◄───│ Product, ...  │    │ 001_docs.sql │  │   │
//! │  │   │  LedgerStore> │    │ subscribe()   │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           │                                                     │   │
//! │  │   ┌───────▼───────┐    ┌───────────────┐                       │   │
//! │  │   │  MemoryStore  │    │  SqliteStore  │                       │   │
//! │  │   │ (tests, demo) │    │ (documents)   │                       │   │
//! │  │   └───────────────┘    └───────────────┘                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - `LedgerStore` trait, write batches, memory and SQLite stores
//! - [`repository`] - Typed repositories and subscription handles
//! - [`database`] - Repository accessors over one shared store
//! - [`migrations`] - Embedded SQLite migrations
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ombor_db::{Database, DbConfig};
//!
//! let db = Database::open_sqlite(DbConfig::new("ombor.db")).await?;
//! let factories = db.factories().list().await?;
//!
//! let _handle = db.products().subscribe(|products| {
//!     println!("{} products", products.len());
//! });
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod database;
pub mod error;
pub mod migrations;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use database::Database;
pub use error::{DbError, DbResult};
pub use repository::{Record, Repository, SubscriptionHandle};
pub use store::memory::MemoryStore;
pub use store::sqlite::{DbConfig, SqliteStore};
pub use store::{Collection, Document, Expect, LedgerStore, Subscription, WriteBatch, WriteOp};
