//! # In-Memory Ledger Store
//!
//! A `RwLock`-guarded map of collections. Used by tests and the `memory`
//! backend.
//!
//! ## Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MemoryStore::new()                  atomic batches                     │
//! │    ops applied to a scratch copy, swapped in only if every op succeeds │
//! │                                                                         │
//! │  MemoryStore::without_atomic_batches()                                  │
//! │    ops applied one by one, an error stops the batch and keeps           │
//! │    whatever already landed (the hosted realtime store behaves so)       │
//! │                                                                         │
//! │  Fault injection (either mode)                                          │
//! │    fail_after(n)     next n write ops succeed, later ones Unavailable  │
//! │    set_unavailable   every call fails with Unavailable                 │
//! │    heal()            clears both                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::notify::{Notifier, Subscription};
use super::{merge_fields, Collection, Document, LedgerStore, WriteBatch, WriteOp};
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    body: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    next_seq: u64,
    collections: HashMap<Collection, HashMap<String, Entry>>,
}

impl MemoryState {
    fn documents(&self, collection: Collection) -> Vec<Document> {
        let Some(entries) = self.collections.get(&collection) else {
            return Vec::new();
        };
        let mut docs: Vec<(&String, &Entry)> = entries.iter().collect();
        docs.sort_by_key(|(_, e)| e.seq);
        docs.into_iter()
            .map(|(id, e)| Document {
                id: id.clone(),
                body: e.body.clone(),
            })
            .collect()
    }

    fn apply(&mut self, op: &WriteOp) -> DbResult<()> {
        match op {
            WriteOp::Create { collection, id, body } => {
                let entries = self.collections.entry(*collection).or_default();
                if entries.contains_key(id) {
                    return Err(DbError::duplicate(collection.as_str(), id.as_str()));
                }
                self.next_seq += 1;
                entries.insert(
                    id.clone(),
                    Entry {
                        seq: self.next_seq,
                        body: body.clone(),
                    },
                );
            }
            WriteOp::Patch {
                collection,
                id,
                fields,
                expect,
            } => {
                let entry = self
                    .collections
                    .get_mut(collection)
                    .and_then(|entries| entries.get_mut(id))
                    .ok_or_else(|| DbError::not_found(collection.as_str(), id.as_str()))?;
                if let Some(expect) = expect {
                    expect.check(*collection, id, &entry.body)?;
                }
                merge_fields(&mut entry.body, fields)?;
            }
            WriteOp::Delete { collection, id } => {
                if let Some(entries) = self.collections.get_mut(collection) {
                    entries.remove(id);
                }
            }
        }
        Ok(())
    }
}

/// In-process Ledger Store.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    notifier: Notifier,
    atomic: bool,
    /// Write ops left before injected failures start. Negative = disabled.
    remaining_writes: AtomicI64,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Store with all-or-nothing batches.
    pub fn new() -> Self {
        Self::with_atomicity(true)
    }

    /// Store that applies batch ops independently.
    pub fn without_atomic_batches() -> Self {
        Self::with_atomicity(false)
    }

    fn with_atomicity(atomic: bool) -> Self {
        MemoryStore {
            state: RwLock::new(MemoryState::default()),
            notifier: Notifier::new(),
            atomic,
            remaining_writes: AtomicI64::new(-1),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Lets the next `n` write ops succeed, then fails the rest.
    pub fn fail_after(&self, n: u32) {
        self.remaining_writes.store(i64::from(n), Ordering::SeqCst);
    }

    /// Makes every call fail (or succeed again) with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Clears all injected faults.
    pub fn heal(&self) {
        self.remaining_writes.store(-1, Ordering::SeqCst);
        self.set_unavailable(false);
    }

    /// Number of live subscriptions on a collection.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.notifier.receiver_count(collection)
    }

    fn check_available(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    /// Consumes one write from the fault budget.
    fn take_write(&self) -> DbResult<()> {
        let outcome = self
            .remaining_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                l if l < 0 => Some(l),
                0 => None,
                l => Some(l - 1),
            });
        match outcome {
            Ok(_) => Ok(()),
            Err(_) => Err(DbError::Unavailable("injected write failure".to_string())),
        }
    }

    fn publish(&self, state: &MemoryState, collections: &[Collection]) {
        for &collection in collections {
            let revision = self.notifier.next_revision();
            self.notifier
                .publish(collection, revision, state.documents(collection));
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn supports_atomic_batch(&self) -> bool {
        self.atomic
    }

    async fn list(&self, collection: Collection) -> DbResult<Vec<Document>> {
        self.check_available()?;
        Ok(self.state.read().await.documents(collection))
    }

    async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .collections
            .get(&collection)
            .and_then(|entries| entries.get(id))
            .map(|e| Document {
                id: id.to_string(),
                body: e.body.clone(),
            }))
    }

    async fn commit(&self, batch: WriteBatch) -> DbResult<()> {
        self.check_available()?;
        if batch.is_empty() {
            return Ok(());
        }

        let touched = batch.collections();
        let mut state = self.state.write().await;

        debug!(ops = batch.len(), atomic = self.atomic, "Committing batch to memory store");

        if self.atomic {
            let mut scratch = state.clone();
            for op in &batch.ops {
                self.take_write()?;
                scratch.apply(op)?;
            }
            *state = scratch;
            self.publish(&state, &touched);
            Ok(())
        } else {
            let mut result = Ok(());
            for op in &batch.ops {
                if let Err(e) = self.take_write().and_then(|_| state.apply(op)) {
                    result = Err(e);
                    break;
                }
            }
            // Whatever landed is visible, even on failure
            self.publish(&state, &touched);
            result
        }
    }

    fn subscribe(&self, collection: Collection) -> Subscription {
        self.notifier.subscribe(collection)
    }

    async fn health_check(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Expect;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_create_get_list_in_insertion_order() {
        let store = MemoryStore::new();
        for name in ["b", "a", "c"] {
            store
                .commit(WriteBatch::new().create(Collection::Factories, name, json!({"name": name})))
                .await
                .unwrap();
        }

        let ids: Vec<String> = store
            .list(Collection::Factories)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let doc = store.get(Collection::Factories, "a").await.unwrap().unwrap();
        assert_eq!(doc.body["name"], "a");
        assert!(store.get(Collection::Customers, "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generated_ids_and_patch() {
        let store = MemoryStore::new();
        let id = store
            .create(Collection::Customers, json!({"name": "Ali", "debt": 0}))
            .await
            .unwrap();
        store
            .patch(Collection::Customers, &id, fields(json!({"debt": 150})))
            .await
            .unwrap();

        let doc = store.get(Collection::Customers, &id).await.unwrap().unwrap();
        assert_eq!(doc.body, json!({"name": "Ali", "debt": 150}));

        let err = store
            .patch(Collection::Customers, "missing", fields(json!({"debt": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = MemoryStore::new();
        let batch = WriteBatch::new().create(Collection::Intents, "key", json!({}));
        store.commit(batch.clone()).await.unwrap();
        assert!(matches!(
            store.commit(batch).await,
            Err(DbError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn test_atomic_batch_rolls_back_on_conflict() {
        let store = MemoryStore::new();
        store
            .commit(WriteBatch::new().create(Collection::Factories, "f", json!({"debt": 400})))
            .await
            .unwrap();

        let batch = WriteBatch::new()
            .create(Collection::FactoryPayments, "p", json!({"amount": 100}))
            .patch_guarded(
                Collection::Factories,
                "f",
                fields(json!({"debt": 300})),
                Expect::new("debt", json!(999)),
            );
        assert!(matches!(store.commit(batch).await, Err(DbError::Conflict { .. })));

        assert!(store.list(Collection::FactoryPayments).await.unwrap().is_empty());
        let f = store.get(Collection::Factories, "f").await.unwrap().unwrap();
        assert_eq!(f.body["debt"], 400);
    }

    #[tokio::test]
    async fn test_non_atomic_batch_keeps_partial_writes() {
        let store = MemoryStore::without_atomic_batches();
        assert!(!store.supports_atomic_batch());

        store.fail_after(1);
        let batch = WriteBatch::new()
            .create(Collection::Products, "a", json!({}))
            .create(Collection::Products, "b", json!({}));
        assert!(matches!(store.commit(batch).await, Err(DbError::Unavailable(_))));

        let docs = store.list(Collection::Products).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "a");
    }

    #[tokio::test]
    async fn test_atomic_fault_applies_nothing() {
        let store = MemoryStore::new();
        store.fail_after(1);
        let batch = WriteBatch::new()
            .create(Collection::Products, "a", json!({}))
            .create(Collection::Products, "b", json!({}));
        assert!(store.commit(batch).await.is_err());

        store.heal();
        assert!(store.list(Collection::Products).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_blocks_reads_and_writes() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(!store.health_check().await);
        assert!(store.list(Collection::Products).await.is_err());
        assert!(store.create(Collection::Products, json!({})).await.is_err());

        store.set_unavailable(false);
        assert!(store.health_check().await);
    }

    #[tokio::test]
    async fn test_subscription_receives_commits() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(Collection::Customers);
        assert!(sub.current().documents.is_empty());

        store.create(Collection::Customers, json!({"name": "Vali"})).await.unwrap();

        let snap = sub.changed().await.unwrap();
        assert_eq!(snap.documents.len(), 1);
        assert_eq!(snap.documents[0].body["name"], "Vali");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        store
            .commit(WriteBatch::new().create(Collection::Intents, "k", json!({})))
            .await
            .unwrap();
        store
            .commit(WriteBatch::new().delete(Collection::Intents, "k"))
            .await
            .unwrap();
        store
            .commit(WriteBatch::new().delete(Collection::Intents, "k"))
            .await
            .unwrap();
        assert!(store.list(Collection::Intents).await.unwrap().is_empty());
    }
}
