//! # Intent Log
//!
//! A write-ahead record of every ledger transaction, keyed by its
//! idempotency key and stored in the `intents` collection.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Intent Lifecycle                                  │
//! │                                                                         │
//! │  ATOMIC STORE                                                          │
//! │  ────────────                                                          │
//! │  commit([ debt patch, stock patches, record create,                    │
//! │           intent create {status: applied} ])   one batch               │
//! │                                                                         │
//! │  NON-ATOMIC STORE                                                      │
//! │  ────────────────                                                      │
//! │  1. create intent {status: pending, batch}                             │
//! │  2. apply each op of the batch, skipping ops that already landed       │
//! │  3. patch intent {status: applied}                                     │
//! │                                                                         │
//! │        ┌─────────┐   all ops landed   ┌─────────┐                       │
//! │        │ PENDING │ ─────────────────► │ APPLIED │ ──► pruned later      │
//! │        └────┬────┘                    └─────────┘                       │
//! │             │ guard conflict during replay                              │
//! │             ▼                                                           │
//! │        ┌─────────┐                                                      │
//! │        │ FAILED  │  reported, never replayed                            │
//! │        └─────────┘                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotent Replay
//! Every guarded patch carries its intent key in `lastIntent`, written in
//! the same patch as the guarded field. Re-applying an op that already
//! landed is a no-op:
//! - a `Create` whose id exists is skipped
//! - a guarded `Patch` whose guard fails is skipped only if the document's
//!   `lastIntent` is this intent's key. Another writer that happened to
//!   leave the same value is still a conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use ombor_core::{EntityKind, Money};
use ombor_db::{Collection, DbError, LedgerStore, Record, WriteBatch, WriteOp};

// =============================================================================
// Intent Types
// =============================================================================

/// Which ledger operation an intent records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Purchase,
    Sale,
    FactoryPayment,
    CustomerPayment,
}

impl IntentKind {
    /// Collection the transaction record is created in.
    pub fn record_collection(&self) -> Collection {
        match self {
            IntentKind::Purchase => Collection::FactoryPurchases,
            IntentKind::Sale => Collection::CustomerPurchases,
            IntentKind::FactoryPayment => Collection::FactoryPayments,
            IntentKind::CustomerPayment => Collection::CustomerPayments,
        }
    }

    pub fn owner_kind(&self) -> EntityKind {
        match self {
            IntentKind::Purchase | IntentKind::FactoryPayment => EntityKind::Factory,
            IntentKind::Sale | IntentKind::CustomerPayment => EntityKind::Customer,
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentKind::Purchase => write!(f, "purchase"),
            IntentKind::Sale => write!(f, "sale"),
            IntentKind::FactoryPayment => write!(f, "factory_payment"),
            IntentKind::CustomerPayment => write!(f, "customer_payment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Applied,
    Failed,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Applied => "applied",
            IntentStatus::Failed => "failed",
        }
    }
}

/// One ledger transaction in the write-ahead log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// The idempotency key.
    pub id: String,
    pub kind: IntentKind,
    pub owner_id: String,
    /// Id of the purchase, sale or payment this intent creates.
    pub record_id: String,
    pub status: IntentStatus,
    /// Owner debt once applied.
    pub new_debt: Money,
    /// Overpayment discarded by this transaction.
    #[serde(default)]
    pub surplus: Money,
    /// The store writes, without the intent itself.
    pub batch: WriteBatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Intent {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Intent {
    pub fn owner_kind(&self) -> EntityKind {
        self.kind.owner_kind()
    }

    pub fn is_pending(&self) -> bool {
        self.status == IntentStatus::Pending
    }
}

/// Field naming the intent whose guarded patch last wrote a document.
pub const LAST_INTENT_FIELD: &str = "lastIntent";

/// Tags every guarded patch in `batch` with the intent key.
pub fn stamp_guarded(batch: &mut WriteBatch, key: &str) {
    for op in &mut batch.ops {
        if let WriteOp::Patch {
            fields,
            expect: Some(_),
            ..
        } = op
        {
            fields.insert(LAST_INTENT_FIELD.to_string(), Value::String(key.to_string()));
        }
    }
}

/// Fields that move an intent to a new status.
pub fn status_fields(status: IntentStatus, error: Option<&str>, at: DateTime<Utc>) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("status".to_string(), Value::String(status.as_str().to_string()));
    fields.insert("updatedAt".to_string(), Value::String(at.to_rfc3339()));
    if let Some(error) = error {
        fields.insert("error".to_string(), Value::String(error.to_string()));
    }
    fields
}

// =============================================================================
// Idempotent Apply
// =============================================================================

/// A batch stopped part way.
#[derive(Debug)]
pub struct ApplyError {
    /// Ops that landed (or had already landed) before the failure.
    pub applied: usize,
    pub source: DbError,
}

/// Applies a batch op by op, skipping ops that already landed.
///
/// Returns the number of ops that are now in place.
pub async fn apply_idempotently(store: &dyn LedgerStore, batch: &WriteBatch) -> Result<usize, ApplyError> {
    for (index, op) in batch.ops.iter().enumerate() {
        let result = store.commit(WriteBatch { ops: vec![op.clone()] }).await;
        match result {
            Ok(()) => {}
            Err(DbError::Duplicate { .. }) if matches!(op, WriteOp::Create { .. }) => {
                debug!(collection = %op.collection(), id = %op.id(), "Create already applied");
            }
            Err(conflict @ DbError::Conflict { .. }) => {
                let landed = stamped_by_op(store, op).await.map_err(|source| ApplyError {
                    applied: index,
                    source,
                })?;
                if !landed {
                    return Err(ApplyError {
                        applied: index,
                        source: conflict,
                    });
                }
                debug!(collection = %op.collection(), id = %op.id(), "Patch already applied");
            }
            Err(source) => {
                return Err(ApplyError {
                    applied: index,
                    source,
                })
            }
        }
    }
    Ok(batch.ops.len())
}

/// Whether a guarded patch already landed: its document still carries the
/// stamp the patch would write.
async fn stamped_by_op(store: &dyn LedgerStore, op: &WriteOp) -> Result<bool, DbError> {
    let WriteOp::Patch {
        collection,
        id,
        fields,
        expect: Some(_),
    } = op
    else {
        return Ok(false);
    };
    let Some(stamp) = fields.get(LAST_INTENT_FIELD) else {
        return Ok(false);
    };
    let current = store.get(*collection, id).await?;
    Ok(current
        .and_then(|doc| doc.body.get(LAST_INTENT_FIELD).cloned())
        .is_some_and(|value| value == *stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ombor_db::{Expect, MemoryStore};
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn payment_batch(key: &str) -> WriteBatch {
        let mut batch = WriteBatch::new()
            .patch_guarded(
                Collection::Factories,
                "f1",
                fields(json!({"debt": 0})),
                Expect::new("debt", json!(400)),
            )
            .create(Collection::FactoryPayments, key, json!({"ownerId": "f1", "amount": 400}));
        stamp_guarded(&mut batch, key);
        batch
    }

    async fn store_with_factory() -> MemoryStore {
        let store = MemoryStore::without_atomic_batches();
        store
            .commit(WriteBatch::new().create(Collection::Factories, "f1", json!({"name": "Un zavodi", "debt": 400})))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_apply_twice_is_noop() {
        let store = store_with_factory().await;
        let batch = payment_batch("pay-1");

        assert_eq!(apply_idempotently(&store, &batch).await.unwrap(), 2);
        assert_eq!(apply_idempotently(&store, &batch).await.unwrap(), 2);

        let factory = store.get(Collection::Factories, "f1").await.unwrap().unwrap();
        assert_eq!(factory.body["debt"], json!(0));
        assert_eq!(store.list(Collection::FactoryPayments).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_after_partial_failure() {
        let store = store_with_factory().await;
        let batch = payment_batch("pay-1");

        store.fail_after(1);
        let err = apply_idempotently(&store, &batch).await.unwrap_err();
        assert_eq!(err.applied, 1);
        assert!(err.source.is_unavailable());
        assert!(store.list(Collection::FactoryPayments).await.unwrap().is_empty());

        store.heal();
        assert_eq!(apply_idempotently(&store, &batch).await.unwrap(), 2);
        assert_eq!(store.list(Collection::FactoryPayments).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_change_is_a_conflict() {
        let store = store_with_factory().await;
        store
            .patch(Collection::Factories, "f1", fields(json!({"debt": 900})))
            .await
            .unwrap();

        let err = apply_idempotently(&store, &payment_batch("pay-1")).await.unwrap_err();
        assert_eq!(err.applied, 0);
        assert!(matches!(err.source, DbError::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_same_value_from_other_intent_is_a_conflict() {
        let store = store_with_factory().await;
        assert_eq!(apply_idempotently(&store, &payment_batch("pay-1")).await.unwrap(), 2);

        // Same debt target, different intent: nothing of pay-2 has landed
        let err = apply_idempotently(&store, &payment_batch("pay-2")).await.unwrap_err();
        assert_eq!(err.applied, 0);
        assert!(matches!(err.source, DbError::Conflict { .. }));
        assert_eq!(store.list(Collection::FactoryPayments).await.unwrap().len(), 1);
    }

    #[test]
    fn test_stamp_only_touches_guarded_patches() {
        let mut batch = payment_batch("pay-1")
            .patch(Collection::Products, "p1", fields(json!({"name": "Un"})));
        stamp_guarded(&mut batch, "pay-3");

        let WriteOp::Patch { fields: guarded, .. } = &batch.ops[0] else {
            panic!("expected patch");
        };
        assert_eq!(guarded[LAST_INTENT_FIELD], json!("pay-3"));
        let WriteOp::Patch { fields: plain, .. } = &batch.ops[2] else {
            panic!("expected patch");
        };
        assert!(!plain.contains_key(LAST_INTENT_FIELD));
    }

    #[test]
    fn test_intent_kind_routing() {
        assert_eq!(IntentKind::Sale.record_collection(), Collection::CustomerPurchases);
        assert_eq!(IntentKind::FactoryPayment.owner_kind(), EntityKind::Factory);
        assert_eq!(serde_json::to_value(IntentKind::CustomerPayment).unwrap(), json!("customer_payment"));
    }

    #[test]
    fn test_status_fields() {
        let at = Utc::now();
        let f = status_fields(IntentStatus::Failed, Some("debt changed"), at);
        assert_eq!(f["status"], json!("failed"));
        assert_eq!(f["error"], json!("debt changed"));
        let parsed: DateTime<Utc> = serde_json::from_value(f["updatedAt"].clone()).unwrap();
        assert_eq!(parsed, at);
    }
}
