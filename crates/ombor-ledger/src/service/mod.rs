//! # Ledger Service
//!
//! Wires the Ledger Engine to the store. Every ledger transaction goes
//! through one path:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transaction Path                                     │
//! │                                                                         │
//! │  record_purchase / record_sale / record_*_payment                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. intent with this idempotency key exists?                           │
//! │       ├── applied ──► return stored record, replayed = true            │
//! │       ├── pending ──► finish it, then as above                         │
//! │       └── failed  ──► Conflict                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. read owner (+ products), run the engine, build one WriteBatch:     │
//! │       debt patch     guarded on the debt that was read                 │
//! │       stock patches  guarded on the quantity that was read             │
//! │       record create                                                    │
//! │       (guarded patches also write lastIntent = key)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. commit                                                             │
//! │       atomic store     batch + applied intent, all or nothing          │
//! │       non-atomic store pending intent, ops one by one, mark applied    │
//! │       │                                                                 │
//! │       ├── guard conflict, nothing written ──► back to 2 (bounded)      │
//! │       └── ok ──► Receipt { record, new_debt, surplus, replayed }       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submodules
//! - [`owners`] - create factories and customers
//! - [`catalog`] - add and edit products outside of purchases
//! - [`transactions`] - purchases, sales and payments
//! - [`reports`] - dashboard, monthly revenue, owner detail, search
//! - [`maintenance`] - reconciliation, intent recovery and pruning

pub mod catalog;
pub mod maintenance;
pub mod owners;
pub mod reports;
pub mod transactions;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ombor_core::validation::validate_id;
use ombor_core::{Customer, EntityKind, Factory, Money};
use ombor_db::repository::encode;
use ombor_db::{
    Collection, Database, DbError, Expect, LedgerStore, MemoryStore, Record, Repository,
    SqliteStore, WriteBatch, WriteOp,
};

use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, LedgerSettings, StoreBackend};
use crate::error::{LedgerError, LedgerResult};
use crate::intent::{
    apply_idempotently, stamp_guarded, status_fields, ApplyError, Intent, IntentKind, IntentStatus,
};

// =============================================================================
// Debt Owners
// =============================================================================

/// A record that carries a running debt: factories and customers.
pub trait DebtOwner: Record {
    const KIND: EntityKind;
    const COLLECTION: Collection;

    fn debt(&self) -> Money;

    fn name(&self) -> &str;
}

impl DebtOwner for Factory {
    const KIND: EntityKind = EntityKind::Factory;
    const COLLECTION: Collection = Collection::Factories;

    fn debt(&self) -> Money {
        self.debt
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl DebtOwner for Customer {
    const KIND: EntityKind = EntityKind::Customer;
    const COLLECTION: Collection = Collection::Customers;

    fn debt(&self) -> Money {
        self.debt
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// Receipts
// =============================================================================

/// What a ledger transaction returns to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt<T> {
    /// The purchase, sale or payment as stored.
    pub record: T,
    /// Owner debt right after this transaction.
    pub new_debt: Money,
    /// Overpayment that was discarded.
    pub surplus: Money,
    /// True if this key was already recorded and nothing was written.
    pub replayed: bool,
    pub idempotency_key: String,
}

/// A planned transaction, ready to commit.
pub(crate) struct Planned<T> {
    pub record: T,
    pub owner_id: String,
    pub new_debt: Money,
    pub surplus: Money,
    pub batch: WriteBatch,
}

enum CommitFailure {
    /// Another call already recorded this idempotency key.
    KeyTaken,
    /// A guard failed before anything was written. Safe to re-plan.
    Retry(DbError),
    Fatal(LedgerError),
}

// =============================================================================
// Ledger
// =============================================================================

/// The ledger service.
///
/// ## Example
/// ```rust,ignore
/// let ledger = Ledger::open(&LedgerConfig::load(None)?).await?;
/// let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await?;
/// let receipt = ledger.record_purchase(PurchaseRequest { .. }).await?;
/// println!("factory now owes {}", receipt.new_debt);
/// ```
#[derive(Clone)]
pub struct Ledger {
    db: Database,
    settings: LedgerSettings,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("db", &self.db)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Ledger {
    /// Builds a ledger over an existing store.
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Ledger {
            db: Database::new(store),
            settings,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Fresh in-memory ledger with default settings.
    pub fn in_memory() -> Self {
        Ledger::new(Arc::new(MemoryStore::new()), LedgerSettings::default())
    }

    /// Replaces the record clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Opens the configured store and, if enabled, finishes pending intents.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let store: Arc<dyn LedgerStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::Sqlite => Arc::new(SqliteStore::open(config.store.to_db_config()?).await?),
        };
        info!(backend = store.backend(), atomic = store.supports_atomic_batch(), "Ledger store ready");

        let ledger = Ledger::new(store, config.ledger.clone());
        if config.ledger.recover_on_startup {
            ledger.recover_pending_intents().await?;
        }
        Ok(ledger)
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    pub(crate) fn store(&self) -> &Arc<dyn LedgerStore> {
        self.db.store()
    }

    pub(crate) fn intents(&self) -> Repository<Intent> {
        self.db.repository(Collection::Intents)
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Loads a factory or customer, `OwnerNotFound` if it does not exist.
    pub(crate) async fn load_owner<O: DebtOwner>(&self, id: &str) -> LedgerResult<O> {
        validate_id(owner_field(O::KIND), id)?;
        self.db
            .repository::<O>(O::COLLECTION)
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(O::KIND, id))
    }

    // =========================================================================
    // Transaction Execution
    // =========================================================================

    /// Runs a planned transaction with idempotency and conflict retries.
    ///
    /// `plan` is called again after every retryable conflict, so it must
    /// re-read whatever it depends on.
    pub(crate) async fn execute<T, F, Fut>(
        &self,
        kind: IntentKind,
        idempotency_key: Option<&str>,
        mut plan: F,
    ) -> LedgerResult<Receipt<T>>
    where
        T: Record,
        F: FnMut() -> Fut,
        Fut: Future<Output = LedgerResult<Planned<T>>>,
    {
        let key = match idempotency_key {
            Some(key) => {
                validate_id("idempotencyKey", key)?;
                key.trim().to_string()
            }
            None => Uuid::new_v4().to_string(),
        };

        if let Some(receipt) = self.replay(kind, &key).await? {
            return Ok(receipt);
        }

        let mut attempt: u32 = 0;
        loop {
            let mut planned = plan().await?;
            stamp_guarded(&mut planned.batch, &key);
            let outcome = if self.store().supports_atomic_batch() {
                self.commit_atomic(kind, &key, &planned).await
            } else {
                self.commit_stepwise(kind, &key, &planned).await
            };

            match outcome {
                Ok(()) => {
                    info!(
                        %kind,
                        key = %key,
                        owner_id = %planned.owner_id,
                        record_id = %planned.record.id(),
                        new_debt = %planned.new_debt,
                        "Transaction recorded"
                    );
                    return Ok(Receipt {
                        record: planned.record,
                        new_debt: planned.new_debt,
                        surplus: planned.surplus,
                        replayed: false,
                        idempotency_key: key,
                    });
                }
                Err(CommitFailure::KeyTaken) => {
                    debug!(%kind, key = %key, "Idempotency key taken concurrently");
                    return self.replay(kind, &key).await?.ok_or_else(|| {
                        LedgerError::Internal(format!("intent {} disappeared", key))
                    });
                }
                Err(CommitFailure::Retry(e)) if attempt < self.settings.max_conflict_retries => {
                    attempt += 1;
                    warn!(%kind, key = %key, attempt, error = %e, "Write conflict, re-planning");
                    tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
                }
                Err(CommitFailure::Retry(e)) => {
                    warn!(%kind, key = %key, attempts = attempt + 1, "Giving up after conflicts");
                    return Err(LedgerError::Conflict(e.to_string()));
                }
                Err(CommitFailure::Fatal(e)) => return Err(e),
            }
        }
    }

    fn new_intent<T: Record>(
        &self,
        kind: IntentKind,
        key: &str,
        planned: &Planned<T>,
        status: IntentStatus,
    ) -> Intent {
        let now = self.now();
        Intent {
            id: key.to_string(),
            kind,
            owner_id: planned.owner_id.clone(),
            record_id: planned.record.id().to_string(),
            status,
            new_debt: planned.new_debt,
            surplus: planned.surplus,
            batch: planned.batch.clone(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// One batch: the writes plus the applied intent.
    async fn commit_atomic<T: Record>(
        &self,
        kind: IntentKind,
        key: &str,
        planned: &Planned<T>,
    ) -> Result<(), CommitFailure> {
        let intent = self.new_intent(kind, key, planned, IntentStatus::Applied);
        let body = encode(&intent).map_err(|e| CommitFailure::Fatal(e.into()))?;

        let mut batch = planned.batch.clone();
        batch.push(WriteOp::Create {
            collection: Collection::Intents,
            id: key.to_string(),
            body,
        });

        match self.store().commit(batch).await {
            Ok(()) => Ok(()),
            Err(DbError::Duplicate { collection, .. })
                if collection == Collection::Intents.as_str() =>
            {
                Err(CommitFailure::KeyTaken)
            }
            Err(e @ DbError::Conflict { .. }) => Err(CommitFailure::Retry(e)),
            Err(e) => Err(CommitFailure::Fatal(e.into())),
        }
    }

    /// Pending intent first, then each write, then mark applied.
    async fn commit_stepwise<T: Record>(
        &self,
        kind: IntentKind,
        key: &str,
        planned: &Planned<T>,
    ) -> Result<(), CommitFailure> {
        let intent = self.new_intent(kind, key, planned, IntentStatus::Pending);
        match self.intents().insert(&intent).await {
            Ok(()) => {}
            Err(DbError::Duplicate { .. }) => return Err(CommitFailure::KeyTaken),
            Err(e) => return Err(CommitFailure::Fatal(e.into())),
        }

        match apply_idempotently(self.store().as_ref(), &planned.batch).await {
            Ok(_) => {
                let fields = status_fields(IntentStatus::Applied, None, self.now());
                if let Err(e) = self.intents().patch(key, fields).await {
                    // Every write landed; recovery will flip the status later
                    warn!(key = %key, error = %e, "Could not mark intent applied");
                }
                Ok(())
            }
            Err(ApplyError {
                applied: 0,
                source: e @ DbError::Conflict { .. },
            }) => {
                // Nothing landed: drop the intent so the key can be re-planned
                self.store()
                    .commit(WriteBatch::new().delete(Collection::Intents, key))
                    .await
                    .map_err(|del| CommitFailure::Fatal(del.into()))?;
                Err(CommitFailure::Retry(e))
            }
            Err(ApplyError {
                applied,
                source: e @ DbError::Conflict { .. },
            }) => {
                let reason = e.to_string();
                error!(key = %key, applied, error = %reason, "Transaction half applied, intent failed");
                let fields = status_fields(IntentStatus::Failed, Some(&reason), self.now());
                if let Err(mark) = self.intents().patch(key, fields).await {
                    warn!(key = %key, error = %mark, "Could not mark intent failed");
                }
                Err(CommitFailure::Fatal(LedgerError::Conflict(reason)))
            }
            Err(ApplyError { applied, source }) => {
                error!(key = %key, applied, error = %source, "Transaction interrupted, intent left pending");
                Err(CommitFailure::Fatal(source.into()))
            }
        }
    }

    /// Returns the stored outcome of an already-used idempotency key.
    async fn replay<T: Record>(&self, kind: IntentKind, key: &str) -> LedgerResult<Option<Receipt<T>>> {
        let Some(intent) = self.intents().get(key).await? else {
            return Ok(None);
        };
        if intent.kind != kind {
            return Err(LedgerError::Validation(format!(
                "idempotency key {} was already used for a {}",
                key, intent.kind
            )));
        }

        let intent = match intent.status {
            IntentStatus::Applied => intent,
            IntentStatus::Pending => self.resume(intent).await?,
            IntentStatus::Failed => {
                return Err(LedgerError::Conflict(format!(
                    "transaction {} failed earlier: {}",
                    key,
                    intent.error.as_deref().unwrap_or("unknown error")
                )))
            }
        };

        let record = self
            .db
            .repository::<T>(kind.record_collection())
            .require(&intent.record_id)
            .await?;
        info!(%kind, key = %key, record_id = %intent.record_id, "Replayed transaction, nothing re-applied");

        Ok(Some(Receipt {
            record,
            new_debt: intent.new_debt,
            surplus: intent.surplus,
            replayed: true,
            idempotency_key: key.to_string(),
        }))
    }
}

// =============================================================================
// Batch Helpers
// =============================================================================

fn owner_field(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Factory => "factoryId",
        EntityKind::Customer => "customerId",
        EntityKind::Product => "productId",
    }
}

/// Sets an owner's debt, guarded on the value the plan was based on.
pub(crate) fn debt_patch(collection: Collection, id: &str, before: Money, after: Money) -> WriteOp {
    let mut fields = Map::new();
    fields.insert("debt".to_string(), Value::from(after.amount()));
    WriteOp::Patch {
        collection,
        id: id.to_string(),
        fields,
        expect: Some(debt_guard(before)),
    }
}

/// Guard on an owner's stored debt. Owners saved without a `debt` field
/// decode as owing nothing, so the guard reads the absent field as 0.
pub(crate) fn debt_guard(before: Money) -> Expect {
    Expect::new("debt", Value::from(before.amount())).missing_as(Value::from(0))
}

/// Patches a product, guarded on the quantity the plan was based on.
pub(crate) fn stock_patch(
    product_id: &str,
    quantity_before: i64,
    mut fields: Map<String, Value>,
    at: DateTime<Utc>,
) -> WriteOp {
    fields.insert("updatedAt".to_string(), Value::String(at.to_rfc3339()));
    WriteOp::Patch {
        collection: Collection::Products,
        id: product_id.to_string(),
        fields,
        expect: Some(Expect::new("quantity", Value::from(quantity_before))),
    }
}
