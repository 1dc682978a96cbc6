//! # Debt Reconciliation
//!
//! Owner debt is stored as a running total and updated in place. This module
//! recomputes it from the immutable transaction log so drift can be detected.
//!
//! ```text
//!   purchases / sales ──► Obligation { debt_left }   ─┐
//!                                                     ├─► sort by date ─► replay ─► derived
//!   payments ───────────► Payment { amount }         ─┘
//!
//!   stored (Factory.debt / Customer.debt) − derived = drift
//! ```
//!
//! Replay uses the same rules as the engine, so a log written only through
//! the engine always reproduces the stored debt exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::EntityKind;
use crate::money::Money;
use crate::types::{Customer, Factory, Payment, Purchase, Sale};

// =============================================================================
// Events
// =============================================================================

/// A debt-moving fact taken from the transaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEvent {
    pub at: DateTime<Utc>,
    pub change: DebtChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtChange {
    /// A purchase or sale added this unpaid amount.
    Obligation { debt_left: Money },
    /// A payment reduced debt by up to this amount.
    Payment { amount: Money },
}

/// Events for a factory: its purchases and the payments made to it.
pub fn factory_events(purchases: &[Purchase], payments: &[Payment]) -> Vec<LedgerEvent> {
    let obligations = purchases.iter().map(|p| LedgerEvent {
        at: p.date,
        change: DebtChange::Obligation {
            debt_left: p.debt_left,
        },
    });
    collect_events(obligations, payments)
}

/// Events for a customer: their sales and the payments they made.
pub fn customer_events(sales: &[Sale], payments: &[Payment]) -> Vec<LedgerEvent> {
    let obligations = sales.iter().map(|s| LedgerEvent {
        at: s.date,
        change: DebtChange::Obligation {
            debt_left: s.debt_left,
        },
    });
    collect_events(obligations, payments)
}

fn collect_events(
    obligations: impl Iterator<Item = LedgerEvent>,
    payments: &[Payment],
) -> Vec<LedgerEvent> {
    let mut events: Vec<LedgerEvent> = obligations
        .chain(payments.iter().map(|p| LedgerEvent {
            at: p.date,
            change: DebtChange::Payment { amount: p.amount },
        }))
        .collect();
    // Stable: on equal dates obligations stay ahead of payments
    events.sort_by_key(|e| e.at);
    events
}

/// Replays events in date order and returns the resulting debt.
///
/// ## Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use ombor_core::reconcile::{derive_debt, DebtChange, LedgerEvent};
/// use ombor_core::Money;
///
/// let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
/// let events = [
///     LedgerEvent { at: day(1), change: DebtChange::Obligation { debt_left: Money::new(400) } },
///     LedgerEvent { at: day(2), change: DebtChange::Payment { amount: Money::new(500) } },
///     LedgerEvent { at: day(3), change: DebtChange::Obligation { debt_left: Money::new(50) } },
/// ];
/// assert_eq!(derive_debt(&events), Money::new(50));
/// ```
pub fn derive_debt(events: &[LedgerEvent]) -> Money {
    let mut ordered: Vec<&LedgerEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.at);

    ordered
        .into_iter()
        .fold(Money::zero(), |debt, event| match event.change {
            DebtChange::Obligation { debt_left } => debt.saturating_add(debt_left),
            DebtChange::Payment { amount } => debt.saturating_sub_floor(amount),
        })
}

// =============================================================================
// Reports
// =============================================================================

/// Identifies the owner a report is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRef {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
}

impl From<&Factory> for OwnerRef {
    fn from(f: &Factory) -> Self {
        OwnerRef {
            kind: EntityKind::Factory,
            id: f.id.clone(),
            name: f.name.clone(),
        }
    }
}

impl From<&Customer> for OwnerRef {
    fn from(c: &Customer) -> Self {
        OwnerRef {
            kind: EntityKind::Customer,
            id: c.id.clone(),
            name: c.name.clone(),
        }
    }
}

/// Stored vs derived debt for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DebtReport {
    pub owner: OwnerRef,
    pub stored: Money,
    pub derived: Money,
    /// `stored − derived`. Positive means the stored figure is too high.
    pub drift: Money,
}

impl DebtReport {
    pub fn new(owner: OwnerRef, stored: Money, events: &[LedgerEvent]) -> Self {
        let derived = derive_debt(events);
        DebtReport {
            owner,
            stored,
            derived,
            drift: stored.saturating_sub(derived),
        }
    }

    #[inline]
    pub fn has_drift(&self) -> bool {
        !self.drift.is_zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
