//! # Repository Module
//!
//! Typed adapters over the Ledger Store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Ledger service                                                        │
//! │       │                                                                 │
//! │       │  db.factories().get("f1")                                      │
//! │       ▼                                                                 │
//! │  Repository<Factory>   (bound to Collection::Factories)                │
//! │  ├── list / get / require                                              │
//! │  ├── create / insert / patch                                           │
//! │  └── subscribe(on_change) ──► SubscriptionHandle                       │
//! │       │                                                                 │
//! │       │  JSON documents                                                │
//! │       ▼                                                                 │
//! │  dyn LedgerStore (memory / sqlite)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decoding
//! Documents are decoded here and nowhere else. A document that fails to
//! decode is skipped (with a warning) by `list` and `subscribe`, and is an
//! explicit `Malformed` error from `get`.
//!
//! ## Available Repositories
//!
//! - [`product`] - `Repository<Product>`, kind filter
//! - [`owner`] - `Repository<Factory>`, `Repository<Customer>`
//! - [`history`] - purchases, sales and payments, per-owner queries

pub mod history;
pub mod owner;
pub mod product;

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::store::{Collection, Document, LedgerStore, WriteBatch};

// =============================================================================
// Record Trait
// =============================================================================

/// A typed record that lives in a collection.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);
}

/// Encodes a record as a document body.
pub fn encode<T: Record>(record: &T) -> DbResult<Value> {
    Ok(serde_json::to_value(record)?)
}

/// Decodes a document, filling `id` from the key when the body lacks it.
pub fn decode<T: Record>(collection: Collection, doc: &Document) -> DbResult<T> {
    let mut body = doc.body.clone();
    if let Value::Object(map) = &mut body {
        map.entry("id")
            .or_insert_with(|| Value::String(doc.id.clone()));
    }
    serde_json::from_value(body).map_err(|e| DbError::Malformed {
        collection: collection.to_string(),
        id: doc.id.clone(),
        reason: e.to_string(),
    })
}

fn decode_all<T: Record>(collection: Collection, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match decode(collection, doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%collection, id = %doc.id, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

// =============================================================================
// Repository
// =============================================================================

/// Typed access to one collection.
pub struct Repository<T> {
    store: Arc<dyn LedgerStore>,
    collection: Collection,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Repository {
            store: Arc::clone(&self.store),
            collection: self.collection,
            _record: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &self.collection)
            .field("backend", &self.store.backend())
            .finish()
    }
}

impl<T: Record> Repository<T> {
    /// Binds a repository to a collection.
    pub fn new(store: Arc<dyn LedgerStore>, collection: Collection) -> Self {
        Repository {
            store,
            collection,
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// All decodable records in insertion order.
    pub async fn list(&self) -> DbResult<Vec<T>> {
        let docs = self.store.list(self.collection).await?;
        debug!(collection = %self.collection, count = docs.len(), "Listed documents");
        Ok(decode_all(self.collection, &docs))
    }

    /// One record, `None` if absent, `Malformed` if it does not decode.
    pub async fn get(&self, id: &str) -> DbResult<Option<T>> {
        self.store
            .get(self.collection, id)
            .await?
            .map(|doc| decode(self.collection, &doc))
            .transpose()
    }

    /// Like `get` but a missing record is `NotFound`.
    pub async fn require(&self, id: &str) -> DbResult<T> {
        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found(self.collection.as_str(), id))
    }

    /// Stores a record under a freshly generated id and returns that id.
    pub async fn create(&self, mut record: T) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        record.set_id(id.clone());
        self.insert(&record).await?;
        Ok(id)
    }

    /// Stores a record under its own id. `Duplicate` if the id is taken.
    pub async fn insert(&self, record: &T) -> DbResult<()> {
        let body = encode(record)?;
        self.store
            .commit(WriteBatch::new().create(self.collection, record.id(), body))
            .await?;
        debug!(collection = %self.collection, id = %record.id(), "Inserted document");
        Ok(())
    }

    /// Merges top-level fields into a stored record.
    pub async fn patch(&self, id: &str, fields: Map<String, Value>) -> DbResult<()> {
        self.store.patch(self.collection, id, fields).await?;
        debug!(collection = %self.collection, id = %id, "Patched document");
        Ok(())
    }

    /// Calls `on_change` with the whole collection now and after every change.
    ///
    /// Must be called inside a Tokio runtime. The subscription lasts until
    /// the handle is dropped or `unsubscribe` is called.
    pub fn subscribe<F>(&self, mut on_change: F) -> SubscriptionHandle
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        let collection = self.collection;
        let mut subscription = self.store.subscribe(collection);

        let task = tokio::spawn(async move {
            let snapshot = subscription.current();
            on_change(decode_all(collection, &snapshot.documents));

            while let Some(snapshot) = subscription.changed().await {
                on_change(decode_all(collection, &snapshot.documents));
            }
            debug!(%collection, "Subscription source closed");
        });

        SubscriptionHandle {
            collection,
            task: Some(task),
        }
    }
}

// =============================================================================
// Subscription Handle
// =============================================================================

/// Keeps a repository subscription alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct SubscriptionHandle {
    collection: Collection,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops delivering snapshots.
    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(collection = %self.collection, "Unsubscribed");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
