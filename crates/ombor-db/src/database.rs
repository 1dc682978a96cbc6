//! # Database Handle
//!
//! One shared store, one repository per collection.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database { store: Arc<dyn LedgerStore> }                               │
//! │                                                                         │
//! │  products()            ──► Repository<Product>   products              │
//! │  factories()           ──► Repository<Factory>   factories             │
//! │  customers()           ──► Repository<Customer>  customers             │
//! │  factory_purchases()   ──► Repository<Purchase>  factoryPurchases      │
//! │  customer_purchases()  ──► Repository<Sale>      customerPurchases     │
//! │  factory_payments()    ──► Repository<Payment>   factoryPayments       │
//! │  customer_payments()   ──► Repository<Payment>   customerPayments      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repositories are cheap to create: each holds a clone of the `Arc`.

use std::sync::Arc;

use ombor_core::{Customer, Factory, Payment, Product, Purchase, Sale};

use crate::repository::{Record, Repository};
use crate::store::memory::MemoryStore;
use crate::store::sqlite::{DbConfig, SqliteStore};
use crate::store::{Collection, LedgerStore};
use crate::DbResult;

/// Main handle providing repository access.
#[derive(Clone)]
pub struct Database {
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl Database {
    /// Wraps an existing store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Database { store }
    }

    /// Fresh in-memory store with atomic batches.
    pub fn in_memory() -> Self {
        Database::new(Arc::new(MemoryStore::new()))
    }

    /// Opens a SQLite-backed store.
    pub async fn open_sqlite(config: DbConfig) -> DbResult<Self> {
        let store = SqliteStore::open(config).await?;
        Ok(Database::new(Arc::new(store)))
    }

    /// The underlying store, for batch writes and raw access.
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Repository for any record type on any collection.
    pub fn repository<T: Record>(&self, collection: Collection) -> Repository<T> {
        Repository::new(Arc::clone(&self.store), collection)
    }

    pub fn products(&self) -> Repository<Product> {
        self.repository(Collection::Products)
    }

    pub fn factories(&self) -> Repository<Factory> {
        self.repository(Collection::Factories)
    }

    pub fn customers(&self) -> Repository<Customer> {
        self.repository(Collection::Customers)
    }

    /// Purchases from factories.
    pub fn factory_purchases(&self) -> Repository<Purchase> {
        self.repository(Collection::FactoryPurchases)
    }

    /// Sales to customers.
    pub fn customer_purchases(&self) -> Repository<Sale> {
        self.repository(Collection::CustomerPurchases)
    }

    pub fn factory_payments(&self) -> Repository<Payment> {
        self.repository(Collection::FactoryPayments)
    }

    pub fn customer_payments(&self) -> Repository<Payment> {
        self.repository(Collection::CustomerPayments)
    }

    /// Checks if the store is answering.
    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }
}
