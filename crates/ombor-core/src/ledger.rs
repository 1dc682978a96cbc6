//! # Ledger Engine
//!
//! The rules that decide how owner debt and stock move when goods are bought,
//! sold and paid for. The same rules apply to factories (purchases) and
//! customers (sales).
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  record_purchase ──┐                    ┌── record_sale                 │
//! │  obligation =      │                    │   obligation = Σ line totals  │
//! │  amount × buyPrice │                    │   + stock check (all lines)   │
//! │                    ▼                    ▼                               │
//! │              ┌───────────────────────────────┐                          │
//! │              │      record_obligation        │                          │
//! │              │  debt_left = max(obl − paid,0)│                          │
//! │              │  new_debt  = debt + debt_left │                          │
//! │              └───────────────────────────────┘                          │
//! │                                                                         │
//! │              ┌───────────────────────────────┐                          │
//! │              │       record_payment          │                          │
//! │              │  new_debt = max(debt − amt,0) │                          │
//! │              └───────────────────────────────┘                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here reads the store or the clock. Callers pass in the current
//! debt, the products involved, and the id/date of the record to create. The
//! result is a plan that the ledger service turns into one write batch.
//!
//! ## Overpayment
//! Paying more than is owed never creates credit. The excess is reported as
//! `surplus` on every outcome so callers can log or display it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, EntityKind, StockShortage};
use crate::money::Money;
use crate::types::{Product, ProductKind, Purchase, Sale, SaleItem, Settlement, Unit};
use crate::validation::{validate_id, validate_line_count, validate_name};

// =============================================================================
// Shared Inputs
// =============================================================================

/// Identity and timestamp of the record a plan will create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub id: String,
    pub owner_id: String,
    pub date: DateTime<Utc>,
}

// =============================================================================
// Obligation
// =============================================================================

/// Result of applying one obligation to an owner's debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationOutcome {
    /// Owner debt after this transaction.
    pub new_debt: Money,
    /// Unpaid part of this transaction.
    pub debt_left: Money,
    /// Amount recorded as paid, clamped to the obligation.
    pub paid: Money,
    /// Overpayment that was discarded.
    pub surplus: Money,
}

/// Applies a purchase or sale obligation to an owner's debt.
///
/// ## Rules
/// - `obligation` must be positive, `paid` must not be negative
/// - `debt_left = max(obligation − paid, 0)`
/// - `new_debt = current_debt + debt_left`
/// - recorded `paid = min(paid, obligation)`, so `paid + debt_left == obligation`
///
/// ## Example
/// ```rust
/// use ombor_core::ledger::record_obligation;
/// use ombor_core::Money;
///
/// let outcome = record_obligation(Money::new(100), Money::new(1500), Money::new(2000)).unwrap();
/// assert_eq!(outcome.debt_left, Money::zero());
/// assert_eq!(outcome.new_debt, Money::new(100));
/// assert_eq!(outcome.paid, Money::new(1500));
/// assert_eq!(outcome.surplus, Money::new(500));
/// ```
pub fn record_obligation(
    current_debt: Money,
    obligation: Money,
    paid: Money,
) -> CoreResult<ObligationOutcome> {
    if !obligation.is_positive() {
        return Err(CoreError::invalid_amount(
            "obligation",
            "must be greater than zero",
        ));
    }
    if paid.is_negative() {
        return Err(CoreError::invalid_amount("paid", "must not be negative"));
    }

    let debt_left = obligation.saturating_sub_floor(paid);
    let recorded_paid = paid.min(obligation);
    let surplus = paid - recorded_paid;
    let new_debt = current_debt
        .max(Money::zero())
        .checked_add(debt_left)
        .ok_or_else(|| CoreError::invalid_amount("debt", "overflow"))?;

    Ok(ObligationOutcome {
        new_debt,
        debt_left,
        paid: recorded_paid,
        surplus,
    })
}

// =============================================================================
// Payment
// =============================================================================

/// What the caller asked to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode", content = "amount")]
pub enum PaymentRequest {
    /// A specific amount.
    Amount(Money),
    /// Whatever the owner currently owes.
    FullSettlement,
}

/// Result of applying a payment to an owner's debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub new_debt: Money,
    /// Amount written on the payment record.
    pub amount: Money,
    pub settlement: Settlement,
    /// Part of `amount` beyond the debt, absorbed without credit.
    pub surplus: Money,
}

/// Applies a payment to an owner's debt.
///
/// ## Rules
/// - `FullSettlement` resolves to the current debt
/// - the resolved amount must be positive (settling a zero debt fails)
/// - `new_debt = max(current_debt − amount, 0)`
///
/// ## Example
/// ```rust
/// use ombor_core::ledger::{record_payment, PaymentRequest};
/// use ombor_core::Money;
///
/// let outcome = record_payment(Money::new(400), PaymentRequest::Amount(Money::new(150))).unwrap();
/// assert_eq!(outcome.new_debt, Money::new(250));
///
/// let outcome = record_payment(Money::new(400), PaymentRequest::FullSettlement).unwrap();
/// assert_eq!(outcome.amount, Money::new(400));
/// assert!(outcome.new_debt.is_zero());
/// ```
pub fn record_payment(current_debt: Money, request: PaymentRequest) -> CoreResult<PaymentOutcome> {
    let current_debt = current_debt.max(Money::zero());
    let (amount, settlement) = match request {
        PaymentRequest::Amount(amount) => (amount, Settlement::Partial),
        PaymentRequest::FullSettlement => (current_debt, Settlement::Full),
    };

    if !amount.is_positive() {
        let reason = match request {
            PaymentRequest::FullSettlement => "nothing is owed",
            PaymentRequest::Amount(_) => "must be greater than zero",
        };
        return Err(CoreError::invalid_amount("amount", reason));
    }

    let new_debt = current_debt.saturating_sub_floor(amount);
    let surplus = amount.saturating_sub_floor(current_debt);

    Ok(PaymentOutcome {
        new_debt,
        amount,
        settlement,
        surplus,
    })
}

// =============================================================================
// Sale
// =============================================================================

/// One line of a checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: String,
    pub amount: i64,
    /// Unit price. Defaults to the product's sell price.
    #[serde(default)]
    pub price: Option<Money>,
}

/// Stock change for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockDelta {
    pub product_id: String,
    pub before: i64,
    pub after: i64,
}

/// Everything a sale will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalePlan {
    pub sale: Sale,
    pub outcome: ObligationOutcome,
    pub stock_deltas: Vec<StockDelta>,
}

/// Plans a checkout: validates every line, checks stock, prices the sale and
/// applies the obligation to the customer's debt.
///
/// Lines for the same product are summed before the stock check. If any
/// product is short, every short product is listed and nothing is planned.
pub fn record_sale(
    current_debt: Money,
    lines: &[SaleLine],
    products: &HashMap<String, Product>,
    paid: Money,
    record: NewRecord,
) -> CoreResult<SalePlan> {
    validate_line_count(lines.len())?;

    // Requested totals per product, in first-seen order
    let mut order: Vec<&str> = Vec::new();
    let mut requested: HashMap<&str, i64> = HashMap::new();
    for line in lines {
        validate_id("productId", &line.product_id)?;
        if line.amount <= 0 {
            return Err(CoreError::invalid_amount(
                "amount",
                format!("line for product {} must be greater than zero", line.product_id),
            ));
        }
        if let Some(price) = line.price {
            if price.is_negative() {
                return Err(CoreError::invalid_amount("price", "must not be negative"));
            }
        }
        if !products.contains_key(&line.product_id) {
            return Err(CoreError::not_found(EntityKind::Product, &line.product_id));
        }

        let total = requested.entry(line.product_id.as_str()).or_insert_with(|| {
            order.push(line.product_id.as_str());
            0
        });
        *total = total
            .checked_add(line.amount)
            .ok_or_else(|| CoreError::invalid_amount("amount", "overflow"))?;
    }

    let mut shortages = Vec::new();
    let mut stock_deltas = Vec::with_capacity(order.len());
    for product_id in &order {
        let product = &products[*product_id];
        let want = requested[product_id];
        if product.can_supply(want) {
            stock_deltas.push(StockDelta {
                product_id: product.id.clone(),
                before: product.quantity,
                after: product.quantity - want,
            });
        } else {
            shortages.push(StockShortage {
                product_id: product.id.clone(),
                name: product.name.clone(),
                available: product.quantity,
                requested: want,
            });
        }
    }
    if !shortages.is_empty() {
        return Err(CoreError::InsufficientStock { shortages });
    }

    let mut items = Vec::with_capacity(lines.len());
    let mut total_price = Money::zero();
    for line in lines {
        let product = &products[&line.product_id];
        let price = line.price.unwrap_or(product.sell_price);
        let line_total = price
            .checked_mul_quantity(line.amount)
            .ok_or_else(|| CoreError::invalid_amount("price", "line total overflow"))?;
        total_price = total_price
            .checked_add(line_total)
            .ok_or_else(|| CoreError::invalid_amount("totalPrice", "overflow"))?;
        items.push(SaleItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            kind: product.kind,
            price,
            amount: line.amount,
            unit: product.unit,
            line_total,
        });
    }

    let outcome = record_obligation(current_debt, total_price, paid)?;

    let sale = Sale {
        id: record.id,
        customer_id: record.owner_id,
        items,
        total_price,
        paid: outcome.paid,
        debt_left: outcome.debt_left,
        date: record.date,
    };

    Ok(SalePlan {
        sale,
        outcome,
        stock_deltas,
    })
}

// =============================================================================
// Purchase
// =============================================================================

/// Details for a product that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    #[serde(default)]
    pub unit: Option<Unit>,
}

/// Which product a purchase restocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductSelector {
    /// Restock a product we already carry.
    Existing(Product),
    /// First purchase of a new product.
    New(NewProduct),
}

/// Quantities and prices on a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseTerms {
    pub amount: i64,
    pub buy_price: Money,
    pub sell_price: Money,
    pub paid: Money,
}

/// How a purchase changes the product catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductUpsert {
    Create(Product),
    Update {
        product_id: String,
        quantity_before: i64,
        quantity_after: i64,
        buy_price: Money,
        sell_price: Money,
    },
}

impl ProductUpsert {
    pub fn product_id(&self) -> &str {
        match self {
            ProductUpsert::Create(product) => &product.id,
            ProductUpsert::Update { product_id, .. } => product_id,
        }
    }
}

/// Everything a purchase will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchasePlan {
    pub purchase: Purchase,
    pub outcome: ObligationOutcome,
    pub product: ProductUpsert,
}

/// Plans a purchase from a factory.
///
/// The obligation is `amount × buy_price`. An existing product gets its
/// quantity raised by `amount` and its prices overwritten. A new product
/// starts with `quantity = amount`.
pub fn record_purchase(
    current_debt: Money,
    selector: ProductSelector,
    terms: PurchaseTerms,
    record: NewRecord,
) -> CoreResult<PurchasePlan> {
    if terms.amount <= 0 {
        return Err(CoreError::invalid_amount("amount", "must be greater than zero"));
    }
    if !terms.buy_price.is_positive() {
        return Err(CoreError::invalid_amount("buyPrice", "must be greater than zero"));
    }
    if terms.sell_price.is_negative() {
        return Err(CoreError::invalid_amount("sellPrice", "must not be negative"));
    }

    let obligation = terms
        .buy_price
        .checked_mul_quantity(terms.amount)
        .ok_or_else(|| CoreError::invalid_amount("buyPrice", "obligation overflow"))?;
    let outcome = record_obligation(current_debt, obligation, terms.paid)?;

    let (product, name, kind, unit) = match selector {
        ProductSelector::Existing(existing) => {
            let quantity_after = existing
                .quantity
                .checked_add(terms.amount)
                .ok_or_else(|| CoreError::invalid_amount("amount", "stock overflow"))?;
            let upsert = ProductUpsert::Update {
                product_id: existing.id.clone(),
                quantity_before: existing.quantity,
                quantity_after,
                buy_price: terms.buy_price,
                sell_price: terms.sell_price,
            };
            (upsert, existing.name, existing.kind, existing.unit)
        }
        ProductSelector::New(new) => {
            validate_id("productId", &new.id)?;
            validate_name("productName", &new.name)?;
            let name = new.name.trim().to_string();
            let product = Product {
                id: new.id,
                name: name.clone(),
                kind: new.kind,
                buy_price: terms.buy_price,
                sell_price: terms.sell_price,
                quantity: terms.amount,
                unit: new.unit,
                created_at: record.date,
                updated_at: None,
            };
            (ProductUpsert::Create(product), name, new.kind, new.unit)
        }
    };

    let purchase = Purchase {
        id: record.id,
        factory_id: record.owner_id,
        product_id: product.product_id().to_string(),
        product_name: name,
        product_type: kind,
        buy_price: terms.buy_price,
        sell_price: terms.sell_price,
        amount: terms.amount,
        amount_type: unit,
        paid: outcome.paid,
        debt_left: outcome.debt_left,
        date: record.date,
    };

    Ok(PurchasePlan {
        purchase,
        outcome,
        product,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
