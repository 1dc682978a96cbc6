//! # Maintenance
//!
//! Sweeps that keep the stored state honest:
//!
//! - **Reconciliation**: replays each owner's transactions and payments and
//!   compares the result with the stored running debt. Drift is reported and
//!   logged, and only corrected when asked.
//! - **Recovery**: finishes intents a non-atomic store left `pending`.
//! - **Pruning**: removes old `applied` intents.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use ombor_core::reconcile::{customer_events, factory_events, DebtReport};
use ombor_core::EntityKind;
use ombor_db::{Collection, DbError, WriteBatch, WriteOp};

use super::{debt_guard, Ledger};
use crate::error::{LedgerError, LedgerResult};
use crate::intent::{apply_idempotently, status_fields, ApplyError, Intent, IntentStatus};

// =============================================================================
// Reports
// =============================================================================

/// Stored vs derived debt for every factory and customer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub generated_at: DateTime<Utc>,
    pub owners: Vec<DebtReport>,
}

impl ReconciliationReport {
    pub fn drifted(&self) -> impl Iterator<Item = &DebtReport> {
        self.owners.iter().filter(|r| r.has_drift())
    }

    pub fn is_clean(&self) -> bool {
        self.drifted().next().is_none()
    }
}

/// Outcome of a recovery sweep, by idempotency key.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub replayed: Vec<String>,
    /// Key and reason.
    pub failed: Vec<(String, String)>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.replayed.is_empty() && self.failed.is_empty()
    }
}

impl Ledger {
    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Derives every owner's debt from its history and compares.
    pub async fn reconcile(&self) -> LedgerResult<ReconciliationReport> {
        let purchases = self.db.factory_purchases().list().await?;
        let sales = self.db.customer_purchases().list().await?;
        let factory_payments = self.db.factory_payments().list().await?;
        let customer_payments = self.db.customer_payments().list().await?;

        let mut owners = Vec::new();
        for factory in self.db.factories().list().await? {
            let bought: Vec<_> = purchases
                .iter()
                .filter(|p| p.factory_id == factory.id)
                .cloned()
                .collect();
            let paid: Vec<_> = factory_payments
                .iter()
                .filter(|p| p.owner_id == factory.id)
                .cloned()
                .collect();
            let events = factory_events(&bought, &paid);
            owners.push(DebtReport::new((&factory).into(), factory.debt, &events));
        }
        for customer in self.db.customers().list().await? {
            let sold: Vec<_> = sales
                .iter()
                .filter(|s| s.customer_id == customer.id)
                .cloned()
                .collect();
            let paid: Vec<_> = customer_payments
                .iter()
                .filter(|p| p.owner_id == customer.id)
                .cloned()
                .collect();
            let events = customer_events(&sold, &paid);
            owners.push(DebtReport::new((&customer).into(), customer.debt, &events));
        }

        let report = ReconciliationReport {
            generated_at: self.now(),
            owners,
        };
        for drift in report.drifted() {
            warn!(
                owner = %drift.owner.kind,
                owner_id = %drift.owner.id,
                name = %drift.owner.name,
                stored = %drift.stored,
                derived = %drift.derived,
                drift = %drift.drift,
                "Debt drift detected"
            );
        }
        info!(owners = report.owners.len(), clean = report.is_clean(), "Reconciliation finished");
        Ok(report)
    }

    /// Writes the derived debt back for every drifted owner in `report`.
    ///
    /// Each write is guarded on the stored debt the report saw. Owners whose
    /// debt moved since then are skipped. Returns how many were corrected.
    pub async fn correct_drift(&self, report: &ReconciliationReport) -> LedgerResult<usize> {
        let mut corrected = 0;
        for drift in report.drifted() {
            let collection = match drift.owner.kind {
                EntityKind::Factory => Collection::Factories,
                EntityKind::Customer => Collection::Customers,
                EntityKind::Product => continue,
            };
            let mut fields = Map::new();
            fields.insert("debt".to_string(), Value::from(drift.derived.amount()));
            let op = WriteOp::Patch {
                collection,
                id: drift.owner.id.clone(),
                fields,
                expect: Some(debt_guard(drift.stored)),
            };

            match self.store().commit(WriteBatch { ops: vec![op] }).await {
                Ok(()) => {
                    corrected += 1;
                    info!(
                        owner_id = %drift.owner.id,
                        from = %drift.stored,
                        to = %drift.derived,
                        "Debt corrected"
                    );
                }
                Err(DbError::Conflict { .. }) => {
                    warn!(owner_id = %drift.owner.id, "Debt changed since reconciliation, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(corrected)
    }

    // =========================================================================
    // Intent Recovery
    // =========================================================================

    /// Finishes every pending intent, oldest first.
    pub async fn recover_pending_intents(&self) -> LedgerResult<RecoveryReport> {
        let mut pending: Vec<Intent> = self
            .intents()
            .list()
            .await?
            .into_iter()
            .filter(Intent::is_pending)
            .collect();
        pending.sort_by_key(|i| i.created_at);

        let mut report = RecoveryReport::default();
        for intent in pending {
            let key = intent.id.clone();
            match self.resume(intent).await {
                Ok(_) => report.replayed.push(key),
                Err(LedgerError::Conflict(reason)) => report.failed.push((key, reason)),
                Err(e) => return Err(e),
            }
        }

        if !report.is_empty() {
            info!(
                replayed = report.replayed.len(),
                failed = report.failed.len(),
                "Pending intents recovered"
            );
        }
        Ok(report)
    }

    /// Applies whatever is missing of a pending intent and marks it applied.
    ///
    /// If the world moved on (a guard no longer matches, or a target is
    /// gone) the intent is marked failed and `Conflict` is returned.
    pub(crate) async fn resume(&self, mut intent: Intent) -> LedgerResult<Intent> {
        match apply_idempotently(self.store().as_ref(), &intent.batch).await {
            Ok(_) => {
                let now = self.now();
                self.intents()
                    .patch(&intent.id, status_fields(IntentStatus::Applied, None, now))
                    .await?;
                info!(key = %intent.id, kind = %intent.kind, "Pending intent applied");
                intent.status = IntentStatus::Applied;
                intent.updated_at = now;
                Ok(intent)
            }
            Err(ApplyError {
                applied,
                source: source @ (DbError::Conflict { .. } | DbError::NotFound { .. }),
            }) => {
                let reason = source.to_string();
                error!(key = %intent.id, kind = %intent.kind, applied, error = %reason, "Pending intent cannot be applied");
                self.intents()
                    .patch(&intent.id, status_fields(IntentStatus::Failed, Some(&reason), self.now()))
                    .await?;
                Err(LedgerError::Conflict(format!(
                    "transaction {} could not be finished: {}",
                    intent.id, reason
                )))
            }
            Err(ApplyError { source, .. }) => Err(source.into()),
        }
    }

    /// Deletes applied intents last touched more than `older_than_days` ago.
    ///
    /// Their keys can be reused afterwards.
    pub async fn prune_intents(&self, older_than_days: u32) -> LedgerResult<usize> {
        let cutoff = self.now() - Duration::days(i64::from(older_than_days));
        let mut batch = WriteBatch::new();
        for intent in self.intents().list().await? {
            if intent.status == IntentStatus::Applied && intent.updated_at < cutoff {
                batch = batch.delete(Collection::Intents, intent.id);
            }
        }

        let pruned = batch.len();
        if pruned > 0 {
            self.store().commit(batch).await?;
            info!(pruned, older_than_days, "Pruned applied intents");
        }
        Ok(pruned)
    }
}
