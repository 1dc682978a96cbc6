//! # Ledger Store
//!
//! The document store every record lives in, behind one object-safe trait.
//!
//! ## Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Ledger Store                                    │
//! │                                                                         │
//! │  collection ──► { id ──► JSON body }     (insertion ordered)            │
//! │                                                                         │
//! │  products   factories   customers   factoryPurchases                   │
//! │  customerPurchases   factoryPayments   customerPayments   intents      │
//! │                                                                         │
//! │  Reads:   list(collection), get(collection, id)                        │
//! │  Writes:  commit(WriteBatch)                                           │
//! │           ├── Create  { id, body }          Duplicate if id exists     │
//! │           ├── Patch   { id, fields, expect } Conflict if guard fails   │
//! │           └── Delete  { id }                                           │
//! │  Push:    subscribe(collection) ──► full snapshot after every commit   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Atomicity
//! `supports_atomic_batch()` says whether `commit` is all-or-nothing.
//! `SqliteStore` always is. `MemoryStore` can be built either way so the
//! non-atomic path (intents + recovery) can be exercised.

pub mod memory;
pub mod notify;
pub mod sqlite;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

pub use notify::{Snapshot, Subscription};

// =============================================================================
// Collections
// =============================================================================

/// A named, flat collection of documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Products,
    Factories,
    Customers,
    /// Purchases from factories.
    FactoryPurchases,
    /// Sales to customers.
    CustomerPurchases,
    FactoryPayments,
    CustomerPayments,
    /// Write-ahead / idempotency log.
    Intents,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Products,
        Collection::Factories,
        Collection::Customers,
        Collection::FactoryPurchases,
        Collection::CustomerPurchases,
        Collection::FactoryPayments,
        Collection::CustomerPayments,
        Collection::Intents,
    ];

    /// Name used as the storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Factories => "factories",
            Collection::Customers => "customers",
            Collection::FactoryPurchases => "factoryPurchases",
            Collection::CustomerPurchases => "customerPurchases",
            Collection::FactoryPayments => "factoryPayments",
            Collection::CustomerPayments => "customerPayments",
            Collection::Intents => "intents",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DbError::QueryFailed(format!("unknown collection '{}'", s)))
    }
}

// =============================================================================
// Documents and Writes
// =============================================================================

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: Value,
}

/// Guard on a patch: `field` must currently equal `value`.
///
/// A missing field compares equal to `missing_as`, or to `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expect {
    pub field: String,
    pub value: Value,
    /// What an absent field reads as, for fields older documents may lack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_as: Option<Value>,
}

impl Expect {
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Expect {
            field: field.into(),
            value,
            missing_as: None,
        }
    }

    /// Reads an absent field as `default` instead of `null`.
    pub fn missing_as(mut self, default: Value) -> Self {
        self.missing_as = Some(default);
        self
    }

    /// Checks the guard against a document body.
    pub fn check(&self, collection: Collection, id: &str, body: &Value) -> DbResult<()> {
        let actual = body
            .get(&self.field)
            .or(self.missing_as.as_ref())
            .unwrap_or(&Value::Null);
        if *actual == self.value {
            Ok(())
        } else {
            Err(DbError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
                field: self.field.clone(),
                expected: self.value.to_string(),
                actual: actual.to_string(),
            })
        }
    }
}

/// One write inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WriteOp {
    Create {
        collection: Collection,
        id: String,
        body: Value,
    },
    Patch {
        collection: Collection,
        id: String,
        fields: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect: Option<Expect>,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl WriteOp {
    pub fn collection(&self) -> Collection {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Patch { collection, .. }
            | WriteOp::Delete { collection, .. } => *collection,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WriteOp::Create { id, .. } | WriteOp::Patch { id, .. } | WriteOp::Delete { id, .. } => {
                id
            }
        }
    }
}

/// Merges `fields` into a document body at the top level.
pub(crate) fn merge_fields(body: &mut Value, fields: &Map<String, Value>) -> DbResult<()> {
    match body {
        Value::Object(map) => {
            for (k, v) in fields {
                map.insert(k.clone(), v.clone());
            }
            Ok(())
        }
        _ => Err(DbError::Serialization("document body is not an object".to_string())),
    }
}

/// An ordered group of writes.
///
/// ## Example
/// ```rust
/// use ombor_db::store::{Collection, Expect, WriteBatch};
/// use serde_json::json;
///
/// let batch = WriteBatch::new()
///     .create(Collection::FactoryPayments, "pay-1", json!({"amount": 400}))
///     .patch_guarded(
///         Collection::Factories,
///         "f1",
///         json!({"debt": 0}).as_object().cloned().unwrap_or_default(),
///         Expect::new("debt", json!(400)),
///     );
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn create(mut self, collection: Collection, id: impl Into<String>, body: Value) -> Self {
        self.ops.push(WriteOp::Create {
            collection,
            id: id.into(),
            body,
        });
        self
    }

    pub fn patch(
        mut self,
        collection: Collection,
        id: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        self.ops.push(WriteOp::Patch {
            collection,
            id: id.into(),
            fields,
            expect: None,
        });
        self
    }

    pub fn patch_guarded(
        mut self,
        collection: Collection,
        id: impl Into<String>,
        fields: Map<String, Value>,
        expect: Expect,
    ) -> Self {
        self.ops.push(WriteOp::Patch {
            collection,
            id: id.into(),
            fields,
            expect: Some(expect),
        });
        self
    }

    pub fn delete(mut self, collection: Collection, id: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete {
            collection,
            id: id.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Distinct collections touched, in first-touched order.
    pub fn collections(&self) -> Vec<Collection> {
        let mut seen = Vec::new();
        for op in &self.ops {
            let c = op.collection();
            if !seen.contains(&c) {
                seen.push(c);
            }
        }
        seen
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// A key-addressed document store with live subscriptions.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Short backend name for logs ("memory", "sqlite").
    fn backend(&self) -> &'static str;

    /// Whether `commit` applies a batch all-or-nothing.
    fn supports_atomic_batch(&self) -> bool;

    /// All documents in insertion order.
    async fn list(&self, collection: Collection) -> DbResult<Vec<Document>>;

    async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>>;

    /// Applies a batch. See `supports_atomic_batch` for failure behaviour.
    async fn commit(&self, batch: WriteBatch) -> DbResult<()>;

    /// Live view of a collection, starting with its current contents.
    fn subscribe(&self, collection: Collection) -> Subscription;

    /// Whether the store answers at all.
    async fn health_check(&self) -> bool;

    /// Appends a document under a fresh UUID and returns the id.
    async fn create(&self, collection: Collection, body: Value) -> DbResult<String> {
        let id = Uuid::new_v4().to_string();
        self.commit(WriteBatch::new().create(collection, id.clone(), body))
            .await?;
        Ok(id)
    }

    /// Merges top-level fields into an existing document.
    async fn patch(&self, collection: Collection, id: &str, fields: Map<String, Value>) -> DbResult<()> {
        self.commit(WriteBatch::new().patch(collection, id, fields))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_names() {
        assert_eq!(Collection::CustomerPurchases.as_str(), "customerPurchases");
        assert_eq!("factoryPayments".parse::<Collection>().unwrap(), Collection::FactoryPayments);
        assert!("orders".parse::<Collection>().is_err());
        assert_eq!(
            serde_json::to_value(Collection::FactoryPurchases).unwrap(),
            json!("factoryPurchases")
        );
    }

    #[test]
    fn test_expect_treats_missing_as_null() {
        let body = json!({"debt": 400});
        assert!(Expect::new("debt", json!(400)).check(Collection::Factories, "f", &body).is_ok());
        assert!(Expect::new("note", Value::Null).check(Collection::Factories, "f", &body).is_ok());
        let err = Expect::new("debt", json!(0))
            .check(Collection::Factories, "f", &body)
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { ref field, .. } if field == "debt"));
    }

    #[test]
    fn test_expect_missing_as_default() {
        let legacy = json!({"name": "Un zavodi"});
        let guard = Expect::new("debt", json!(0)).missing_as(json!(0));
        assert!(guard.check(Collection::Factories, "f", &legacy).is_ok());
        assert!(Expect::new("debt", json!(0)).check(Collection::Factories, "f", &legacy).is_err());

        // A present field is compared as stored
        let err = guard
            .check(Collection::Factories, "f", &json!({"debt": 50}))
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { ref actual, .. } if actual == "50"));
    }

    #[test]
    fn test_batch_round_trips_as_json() {
        let batch = WriteBatch::new()
            .create(Collection::Products, "p1", json!({"name": "Flour"}))
            .delete(Collection::Intents, "k");
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["ops"][0]["op"], "create");
        let back: WriteBatch = serde_json::from_value(json).unwrap();
        assert_eq!(back, batch);
        assert_eq!(back.collections(), vec![Collection::Products, Collection::Intents]);
    }
}
