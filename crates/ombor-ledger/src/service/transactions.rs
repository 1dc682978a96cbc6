//! # Ledger Transactions
//!
//! Purchases, sales and payments. Each one reads the owner (and products),
//! asks the engine for a plan, and hands the resulting batch to
//! [`Ledger::execute`](super::Ledger).
//!
//! ## Batch Shapes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  purchase   factories/{id}.debt       guarded on old debt              │
//! │             products/{id}             create, or quantity + prices     │
//! │                                       guarded on old quantity          │
//! │             factoryPurchases/{new}    create                           │
//! │                                                                         │
//! │  sale       customers/{id}.debt       guarded on old debt              │
//! │             products/{id}.quantity    one per product, guarded         │
//! │             customerPurchases/{new}   create                           │
//! │                                                                         │
//! │  payment    {owner}.debt              guarded on old debt              │
//! │             {owner}Payments/{new}     create                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Owner patches come first so that on a non-atomic store a lost race is
//! caught before anything else lands.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;
use uuid::Uuid;

use ombor_core::ledger::{
    self, NewProduct, NewRecord, PaymentRequest, ProductSelector, ProductUpsert, PurchaseTerms,
    SaleLine,
};
use ombor_core::validation::{normalize_optional, validate_id, validate_optional_text};
use ombor_core::{Customer, EntityKind, Factory, Money, Payment, ProductKind, Purchase, Sale, Unit};
use ombor_db::repository::encode;
use ombor_db::{Collection, WriteBatch, WriteOp};

use super::{debt_patch, stock_patch, DebtOwner, Ledger, Planned, Receipt};
use crate::error::{LedgerError, LedgerResult};
use crate::intent::IntentKind;

// =============================================================================
// Requests
// =============================================================================

/// Which product a purchase restocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PurchaseProduct {
    Existing {
        #[serde(rename = "productId")]
        product_id: String,
    },
    New {
        name: String,
        #[serde(rename = "type")]
        kind: ProductKind,
        #[serde(default, rename = "amountType")]
        unit: Option<Unit>,
    },
}

/// Goods bought from a factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub factory_id: String,
    pub product: PurchaseProduct,
    pub amount: i64,
    pub buy_price: Money,
    pub sell_price: Money,
    #[serde(default)]
    pub paid: Money,
    /// Same key, same transaction: a repeat returns the first result.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// A checkout for one customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    pub customer_id: String,
    pub lines: Vec<SaleLine>,
    #[serde(default)]
    pub paid: Money,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// A payment to a factory or from a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPayment {
    pub owner_id: String,
    pub request: PaymentRequest,
    /// Defaults to "Full payment" or "Partial payment".
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

impl NewPayment {
    pub fn amount(owner_id: impl Into<String>, amount: Money) -> Self {
        NewPayment {
            owner_id: owner_id.into(),
            request: PaymentRequest::Amount(amount),
            note: None,
            idempotency_key: None,
        }
    }

    /// Pays off whatever the owner currently owes.
    pub fn full(owner_id: impl Into<String>) -> Self {
        NewPayment {
            request: PaymentRequest::FullSettlement,
            ..NewPayment::amount(owner_id, Money::zero())
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

// =============================================================================
// Operations
// =============================================================================

impl Ledger {
    /// Records goods bought from a factory and raises its debt by the unpaid part.
    pub async fn record_purchase(&self, request: PurchaseRequest) -> LedgerResult<Receipt<Purchase>> {
        let req = &request;
        let receipt = self
            .execute(IntentKind::Purchase, req.idempotency_key.as_deref(), move || {
                self.plan_purchase(req)
            })
            .await?;
        log_surplus(EntityKind::Factory, &req.factory_id, &receipt);
        Ok(receipt)
    }

    /// Records a checkout: checks stock, lowers it, and raises the customer's
    /// debt by the unpaid part.
    pub async fn record_sale(&self, request: SaleRequest) -> LedgerResult<Receipt<Sale>> {
        let req = &request;
        let receipt = self
            .execute(IntentKind::Sale, req.idempotency_key.as_deref(), move || {
                self.plan_sale(req)
            })
            .await?;
        log_surplus(EntityKind::Customer, &req.customer_id, &receipt);
        Ok(receipt)
    }

    /// Records money paid to a factory.
    pub async fn record_factory_payment(&self, payment: NewPayment) -> LedgerResult<Receipt<Payment>> {
        self.record_payment::<Factory>(IntentKind::FactoryPayment, payment)
            .await
    }

    /// Records money received from a customer.
    pub async fn record_customer_payment(&self, payment: NewPayment) -> LedgerResult<Receipt<Payment>> {
        self.record_payment::<Customer>(IntentKind::CustomerPayment, payment)
            .await
    }

    async fn record_payment<O: DebtOwner>(
        &self,
        kind: IntentKind,
        payment: NewPayment,
    ) -> LedgerResult<Receipt<Payment>> {
        validate_optional_text("note", payment.note.as_deref())?;

        let req = &payment;
        let receipt = self
            .execute(kind, req.idempotency_key.as_deref(), move || {
                self.plan_payment::<O>(kind, req)
            })
            .await?;
        log_surplus(O::KIND, &req.owner_id, &receipt);
        Ok(receipt)
    }

    // =========================================================================
    // Planning
    // =========================================================================

    async fn plan_purchase(&self, request: &PurchaseRequest) -> LedgerResult<Planned<Purchase>> {
        let factory: Factory = self.load_owner(&request.factory_id).await?;

        let selector = match &request.product {
            PurchaseProduct::Existing { product_id } => {
                validate_id("productId", product_id)?;
                let product = self
                    .db
                    .products()
                    .get(product_id)
                    .await?
                    .ok_or_else(|| LedgerError::not_found(EntityKind::Product, product_id))?;
                ProductSelector::Existing(product)
            }
            PurchaseProduct::New { name, kind, unit } => ProductSelector::New(NewProduct {
                id: Uuid::new_v4().to_string(),
                name: name.clone(),
                kind: *kind,
                unit: *unit,
            }),
        };

        let now = self.now();
        let terms = PurchaseTerms {
            amount: request.amount,
            buy_price: request.buy_price,
            sell_price: request.sell_price,
            paid: request.paid,
        };
        let plan = ledger::record_purchase(factory.debt, selector, terms, new_record(&factory.id, now))?;

        let mut batch = WriteBatch::new();
        batch.push(debt_patch(
            Collection::Factories,
            &factory.id,
            factory.debt,
            plan.outcome.new_debt,
        ));
        match &plan.product {
            ProductUpsert::Create(product) => batch.push(WriteOp::Create {
                collection: Collection::Products,
                id: product.id.clone(),
                body: encode(product)?,
            }),
            ProductUpsert::Update {
                product_id,
                quantity_before,
                quantity_after,
                buy_price,
                sell_price,
            } => {
                let mut fields = Map::new();
                fields.insert("quantity".to_string(), Value::from(*quantity_after));
                fields.insert("buyPrice".to_string(), Value::from(buy_price.amount()));
                fields.insert("sellPrice".to_string(), Value::from(sell_price.amount()));
                batch.push(stock_patch(product_id, *quantity_before, fields, now));
            }
        }
        batch.push(WriteOp::Create {
            collection: Collection::FactoryPurchases,
            id: plan.purchase.id.clone(),
            body: encode(&plan.purchase)?,
        });

        Ok(Planned {
            record: plan.purchase,
            owner_id: factory.id,
            new_debt: plan.outcome.new_debt,
            surplus: plan.outcome.surplus,
            batch,
        })
    }

    async fn plan_sale(&self, request: &SaleRequest) -> LedgerResult<Planned<Sale>> {
        let customer: Customer = self.load_owner(&request.customer_id).await?;
        let products = self
            .db
            .products()
            .by_ids(request.lines.iter().map(|line| line.product_id.as_str()))
            .await?;

        let now = self.now();
        let plan = ledger::record_sale(
            customer.debt,
            &request.lines,
            &products,
            request.paid,
            new_record(&customer.id, now),
        )?;

        let mut batch = WriteBatch::new();
        batch.push(debt_patch(
            Collection::Customers,
            &customer.id,
            customer.debt,
            plan.outcome.new_debt,
        ));
        for delta in &plan.stock_deltas {
            let mut fields = Map::new();
            fields.insert("quantity".to_string(), Value::from(delta.after));
            batch.push(stock_patch(&delta.product_id, delta.before, fields, now));
        }
        batch.push(WriteOp::Create {
            collection: Collection::CustomerPurchases,
            id: plan.sale.id.clone(),
            body: encode(&plan.sale)?,
        });

        Ok(Planned {
            record: plan.sale,
            owner_id: customer.id,
            new_debt: plan.outcome.new_debt,
            surplus: plan.outcome.surplus,
            batch,
        })
    }

    async fn plan_payment<O: DebtOwner>(
        &self,
        kind: IntentKind,
        payment: &NewPayment,
    ) -> LedgerResult<Planned<Payment>> {
        let owner: O = self.load_owner(&payment.owner_id).await?;
        let outcome = ledger::record_payment(owner.debt(), payment.request)?;

        let record = Payment {
            id: Uuid::new_v4().to_string(),
            owner_id: owner.id().to_string(),
            amount: outcome.amount,
            note: normalize_optional(payment.note.clone())
                .unwrap_or_else(|| outcome.settlement.default_note().to_string()),
            settlement: outcome.settlement,
            date: self.now(),
        };

        let batch = WriteBatch {
            ops: vec![
                debt_patch(O::COLLECTION, owner.id(), owner.debt(), outcome.new_debt),
                WriteOp::Create {
                    collection: kind.record_collection(),
                    id: record.id.clone(),
                    body: encode(&record)?,
                },
            ],
        };

        Ok(Planned {
            record,
            owner_id: owner.id().to_string(),
            new_debt: outcome.new_debt,
            surplus: outcome.surplus,
            batch,
        })
    }
}

fn new_record(owner_id: &str, date: chrono::DateTime<chrono::Utc>) -> NewRecord {
    NewRecord {
        id: Uuid::new_v4().to_string(),
        owner_id: owner_id.to_string(),
        date,
    }
}

/// Overpayment is discarded, never silently.
fn log_surplus<T>(owner: EntityKind, owner_id: &str, receipt: &Receipt<T>) {
    if receipt.surplus.is_positive() && !receipt.replayed {
        warn!(
            owner = %owner,
            owner_id = %owner_id,
            surplus = %receipt.surplus,
            key = %receipt.idempotency_key,
            "Overpayment discarded, no credit recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::catalog::ProductDraft;
    use crate::config::LedgerSettings;
    use crate::service::owners::{NewCustomer, NewFactory};
    use async_trait::async_trait;
    use ombor_core::{Product, Settlement};
    use ombor_db::{DbResult, Document, LedgerStore, MemoryStore, Subscription};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Bumps the owner's debt by 100 just before each of the next `races`
    /// transaction commits, as if another till got there first.
    struct RacingStore {
        inner: MemoryStore,
        races: AtomicU32,
    }

    #[async_trait]
    impl LedgerStore for RacingStore {
        fn backend(&self) -> &'static str {
            "racing"
        }

        fn supports_atomic_batch(&self) -> bool {
            true
        }

        async fn list(&self, collection: Collection) -> DbResult<Vec<Document>> {
            self.inner.list(collection).await
        }

        async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>> {
            self.inner.get(collection, id).await
        }

        async fn commit(&self, batch: WriteBatch) -> DbResult<()> {
            let is_transaction = batch.collections().contains(&Collection::Intents);
            if is_transaction && self.races.load(Ordering::SeqCst) > 0 {
                self.races.fetch_sub(1, Ordering::SeqCst);
                if let Some(WriteOp::Patch { collection, id, .. }) = batch.ops.first() {
                    let doc = self.inner.get(*collection, id).await?.unwrap();
                    let debt = doc.body["debt"].as_i64().unwrap();
                    let mut fields = Map::new();
                    fields.insert("debt".to_string(), Value::from(debt + 100));
                    self.inner.patch(*collection, id, fields).await?;
                }
            }
            self.inner.commit(batch).await
        }

        fn subscribe(&self, collection: Collection) -> Subscription {
            self.inner.subscribe(collection)
        }

        async fn health_check(&self) -> bool {
            self.inner.health_check().await
        }
    }

    fn racing_ledger(races: u32) -> Ledger {
        let store = RacingStore {
            inner: MemoryStore::new(),
            races: AtomicU32::new(races),
        };
        Ledger::new(Arc::new(store), LedgerSettings::default())
    }

    /// Non-atomic store where another till records `rival` just before the
    /// next guarded debt patch lands.
    struct RivalTillStore {
        inner: Arc<MemoryStore>,
        till: Ledger,
        rival: std::sync::Mutex<Option<NewPayment>>,
    }

    impl RivalTillStore {
        fn new() -> Self {
            let inner = Arc::new(MemoryStore::without_atomic_batches());
            RivalTillStore {
                till: Ledger::new(inner.clone(), LedgerSettings::default()),
                inner,
                rival: std::sync::Mutex::new(None),
            }
        }

        fn arm(&self, payment: NewPayment) {
            *self.rival.lock().unwrap() = Some(payment);
        }
    }

    #[async_trait]
    impl LedgerStore for RivalTillStore {
        fn backend(&self) -> &'static str {
            "rival-till"
        }

        fn supports_atomic_batch(&self) -> bool {
            false
        }

        async fn list(&self, collection: Collection) -> DbResult<Vec<Document>> {
            self.inner.list(collection).await
        }

        async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>> {
            self.inner.get(collection, id).await
        }

        async fn commit(&self, batch: WriteBatch) -> DbResult<()> {
            let debt_patch = matches!(
                batch.ops.as_slice(),
                [WriteOp::Patch { collection: Collection::Factories, expect: Some(_), .. }]
            );
            if debt_patch {
                let rival = self.rival.lock().unwrap().take();
                if let Some(payment) = rival {
                    self.till.record_factory_payment(payment).await.unwrap();
                }
            }
            self.inner.commit(batch).await
        }

        fn subscribe(&self, collection: Collection) -> Subscription {
            self.inner.subscribe(collection)
        }

        async fn health_check(&self) -> bool {
            self.inner.health_check().await
        }
    }

    async fn setup() -> (Ledger, Factory, Customer) {
        let ledger = Ledger::in_memory();
        let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await.unwrap();
        let customer = ledger.create_customer(NewCustomer::named("Aziz")).await.unwrap();
        (ledger, factory, customer)
    }

    async fn stocked(ledger: &Ledger, name: &str, quantity: i64, sell: i64) -> Product {
        ledger
            .add_product(ProductDraft {
                name: name.to_string(),
                kind: ProductKind::Flour,
                buy_price: Money::new(sell / 2 + 1),
                sell_price: Money::new(sell),
                quantity,
                unit: Some(Unit::Piece),
            })
            .await
            .unwrap()
    }

    fn new_product_purchase(factory_id: &str, amount: i64, buy: i64, paid: i64) -> PurchaseRequest {
        PurchaseRequest {
            factory_id: factory_id.to_string(),
            product: PurchaseProduct::New {
                name: "Un 50kg".to_string(),
                kind: ProductKind::Flour,
                unit: Some(Unit::Sack),
            },
            amount,
            buy_price: Money::new(buy),
            sell_price: Money::new(buy + 2),
            paid: Money::new(paid),
            idempotency_key: None,
        }
    }

    fn sale(customer_id: &str, lines: &[(&str, i64)], paid: i64) -> SaleRequest {
        SaleRequest {
            customer_id: customer_id.to_string(),
            lines: lines
                .iter()
                .map(|(id, amount)| SaleLine {
                    product_id: id.to_string(),
                    amount: *amount,
                    price: None,
                })
                .collect(),
            paid: Money::new(paid),
            idempotency_key: None,
        }
    }

    async fn factory_debt(ledger: &Ledger, id: &str) -> Money {
        ledger.db().factories().require(id).await.unwrap().debt
    }

    async fn customer_debt(ledger: &Ledger, id: &str) -> Money {
        ledger.db().customers().require(id).await.unwrap().debt
    }

    // -------------------------------------------------------------------------
    // End-to-end scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_factory_purchase_then_settle() {
        let (ledger, factory, _) = setup().await;

        let receipt = ledger
            .record_purchase(new_product_purchase(&factory.id, 100, 10, 600))
            .await
            .unwrap();
        assert_eq!(receipt.new_debt, Money::new(400));
        assert_eq!(receipt.record.paid, Money::new(600));
        assert_eq!(receipt.record.debt_left, Money::new(400));
        assert_eq!(factory_debt(&ledger, &factory.id).await, Money::new(400));

        let product = ledger.db().products().require(&receipt.record.product_id).await.unwrap();
        assert_eq!(product.quantity, 100);

        let payment = ledger
            .record_factory_payment(NewPayment::amount(&factory.id, Money::new(400)))
            .await
            .unwrap();
        assert!(payment.new_debt.is_zero());
        assert_eq!(payment.record.note, "Partial payment");
        assert!(factory_debt(&ledger, &factory.id).await.is_zero());
    }

    #[tokio::test]
    async fn test_customer_overpay_is_not_credited() {
        let (ledger, _, customer) = setup().await;
        let flour = stocked(&ledger, "Un", 20, 100).await;

        let receipt = ledger
            .record_sale(sale(&customer.id, &[(&flour.id, 15)], 2000))
            .await
            .unwrap();

        assert_eq!(receipt.record.total_price, Money::new(1500));
        assert!(receipt.record.debt_left.is_zero());
        assert_eq!(receipt.record.paid, Money::new(1500));
        assert_eq!(receipt.surplus, Money::new(500));
        assert!(customer_debt(&ledger, &customer.id).await.is_zero());
        assert_eq!(ledger.db().products().require(&flour.id).await.unwrap().quantity, 5);
    }

    #[tokio::test]
    async fn test_sale_shortage_changes_nothing() {
        let (ledger, _, customer) = setup().await;
        let a = stocked(&ledger, "A", 5, 10).await;
        let b = stocked(&ledger, "B", 4, 10).await;

        let err = ledger
            .record_sale(sale(&customer.id, &[(&a.id, 3), (&b.id, 10)], 0))
            .await
            .unwrap_err();

        match err {
            LedgerError::InsufficientStock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].product_id, b.id);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(ledger.db().products().require(&a.id).await.unwrap().quantity, 5);
        assert_eq!(ledger.db().products().require(&b.id).await.unwrap().quantity, 4);
        assert!(customer_debt(&ledger, &customer.id).await.is_zero());
        assert!(ledger.db().customer_purchases().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_payments_never_go_negative() {
        let (ledger, _, customer) = setup().await;
        let flour = stocked(&ledger, "Un", 10, 100).await;
        ledger
            .record_sale(sale(&customer.id, &[(&flour.id, 3)], 0))
            .await
            .unwrap();
        assert_eq!(customer_debt(&ledger, &customer.id).await, Money::new(300));

        for (amount, expected) in [(100, 200), (150, 50), (80, 0)] {
            let receipt = ledger
                .record_customer_payment(NewPayment::amount(&customer.id, Money::new(amount)))
                .await
                .unwrap();
            assert_eq!(receipt.new_debt, Money::new(expected));
        }
        assert!(customer_debt(&ledger, &customer.id).await.is_zero());

        let err = ledger
            .record_customer_payment(NewPayment::full(&customer.id))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));
    }

    #[tokio::test]
    async fn test_full_settlement_note_and_custom_note() {
        let (ledger, factory, _) = setup().await;
        ledger
            .record_purchase(new_product_purchase(&factory.id, 10, 10, 0))
            .await
            .unwrap();

        let partial = ledger
            .record_factory_payment(NewPayment::amount(&factory.id, Money::new(30)).with_note("  cash  "))
            .await
            .unwrap();
        assert_eq!(partial.record.note, "cash");

        let full = ledger
            .record_factory_payment(NewPayment::full(&factory.id))
            .await
            .unwrap();
        assert_eq!(full.record.amount, Money::new(70));
        assert_eq!(full.record.settlement, Settlement::Full);
        assert_eq!(full.record.note, "Full payment");
        assert!(full.new_debt.is_zero());
    }

    #[tokio::test]
    async fn test_restock_existing_product() {
        let (ledger, factory, _) = setup().await;
        let flour = stocked(&ledger, "Un", 4, 100).await;

        let receipt = ledger
            .record_purchase(PurchaseRequest {
                factory_id: factory.id.clone(),
                product: PurchaseProduct::Existing {
                    product_id: flour.id.clone(),
                },
                amount: 6,
                buy_price: Money::new(70),
                sell_price: Money::new(95),
                paid: Money::new(420),
                idempotency_key: None,
            })
            .await
            .unwrap();

        assert!(receipt.new_debt.is_zero());
        let product = ledger.db().products().require(&flour.id).await.unwrap();
        assert_eq!(product.quantity, 10);
        assert_eq!(product.buy_price, Money::new(70));
        assert_eq!(product.sell_price, Money::new(95));
        assert!(product.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_purchase_rejected_before_any_write() {
        let (ledger, factory, _) = setup().await;

        let err = ledger
            .record_purchase(new_product_purchase(&factory.id, 0, 10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount { .. }));

        let mut missing = new_product_purchase(&factory.id, 1, 10, 0);
        missing.product = PurchaseProduct::Existing {
            product_id: "gone".to_string(),
        };
        let err = ledger.record_purchase(missing).await.unwrap_err();
        assert!(matches!(err, LedgerError::OwnerNotFound { entity: EntityKind::Product, .. }));

        assert!(ledger.db().products().list().await.unwrap().is_empty());
        assert!(ledger.db().factory_purchases().list().await.unwrap().is_empty());
        assert!(ledger.db().store().list(Collection::Intents).await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Idempotency
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_replayed_payment_is_not_reapplied() {
        let (ledger, factory, _) = setup().await;
        ledger
            .record_purchase(new_product_purchase(&factory.id, 100, 10, 0))
            .await
            .unwrap();

        let first = ledger
            .record_factory_payment(NewPayment::amount(&factory.id, Money::new(300)).with_key("pay-7"))
            .await
            .unwrap();
        let again = ledger
            .record_factory_payment(NewPayment::amount(&factory.id, Money::new(300)).with_key("pay-7"))
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(again.replayed);
        assert_eq!(again.record, first.record);
        assert_eq!(again.new_debt, Money::new(700));
        assert_eq!(factory_debt(&ledger, &factory.id).await, Money::new(700));
        assert_eq!(ledger.db().factory_payments().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replayed_sale_keeps_stock() {
        let (ledger, _, customer) = setup().await;
        let flour = stocked(&ledger, "Un", 10, 100).await;

        let mut request = sale(&customer.id, &[(&flour.id, 4)], 100);
        request.idempotency_key = Some("checkout-1".to_string());
        let first = ledger.record_sale(request.clone()).await.unwrap();
        let again = ledger.record_sale(request).await.unwrap();

        assert_eq!(again.record.id, first.record.id);
        assert!(again.replayed);
        assert_eq!(ledger.db().products().require(&flour.id).await.unwrap().quantity, 6);
        assert_eq!(customer_debt(&ledger, &customer.id).await, Money::new(300));
    }

    // -------------------------------------------------------------------------
    // Conflicts
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_conflict_is_replanned() {
        let ledger = racing_ledger(1);
        let customer = ledger.create_customer(NewCustomer::named("Aziz")).await.unwrap();
        let flour = stocked(&ledger, "Un", 10, 100).await;

        let receipt = ledger
            .record_sale(sale(&customer.id, &[(&flour.id, 3)], 0))
            .await
            .unwrap();

        // The concurrent +100 is kept and the sale lands on top of it
        assert_eq!(receipt.new_debt, Money::new(400));
        assert_eq!(customer_debt(&ledger, &customer.id).await, Money::new(400));
        assert_eq!(ledger.db().products().require(&flour.id).await.unwrap().quantity, 7);
        assert_eq!(ledger.db().customer_purchases().list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_equal_payment_from_other_till_is_not_taken_as_ours() {
        let store = Arc::new(RivalTillStore::new());
        let ledger = Ledger::new(store.clone(), LedgerSettings::default());
        let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await.unwrap();
        ledger
            .record_purchase(new_product_purchase(&factory.id, 40, 10, 0))
            .await
            .unwrap();

        // Both tills plan 400 -> 300; the other one lands first
        store.arm(NewPayment::amount(&factory.id, Money::new(100)).with_key("till-2"));
        let receipt = ledger
            .record_factory_payment(NewPayment::amount(&factory.id, Money::new(100)).with_key("till-1"))
            .await
            .unwrap();

        assert!(!receipt.replayed);
        assert_eq!(receipt.new_debt, Money::new(200));
        assert_eq!(factory_debt(&ledger, &factory.id).await, Money::new(200));
        assert_eq!(ledger.db().factory_payments().list().await.unwrap().len(), 2);
        assert!(ledger.reconcile().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_retries() {
        let ledger = racing_ledger(u32::MAX);
        let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await.unwrap();

        let err = ledger
            .record_purchase(new_product_purchase(&factory.id, 5, 10, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::Conflict(_)));
        assert!(err.is_retryable());
        assert!(ledger.db().factory_purchases().list().await.unwrap().is_empty());
        assert!(ledger.db().products().list().await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Older documents
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_owner_saved_without_debt_field() {
        let ledger = Ledger::in_memory();
        ledger
            .store()
            .commit(WriteBatch::new().create(
                Collection::Factories,
                "legacy",
                serde_json::json!({"name": "Eski zavod", "createdAt": "2023-05-01T08:00:00Z"}),
            ))
            .await
            .unwrap();
        assert!(factory_debt(&ledger, "legacy").await.is_zero());

        let receipt = ledger
            .record_purchase(new_product_purchase("legacy", 10, 10, 40))
            .await
            .unwrap();
        assert_eq!(receipt.new_debt, Money::new(60));

        ledger
            .record_factory_payment(NewPayment::amount("legacy", Money::new(25)))
            .await
            .unwrap();
        assert_eq!(factory_debt(&ledger, "legacy").await, Money::new(35));
        assert!(ledger.reconcile().await.unwrap().is_clean());
    }

    // -------------------------------------------------------------------------
    // Round trip and ordering
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_records_round_trip_in_date_order() {
        let (ledger, factory, customer) = setup().await;
        let flour = stocked(&ledger, "Un", 50, 100).await;

        let purchase = ledger
            .record_purchase(new_product_purchase(&factory.id, 5, 10, 20))
            .await
            .unwrap()
            .record;
        assert_eq!(ledger.db().factory_purchases().require(&purchase.id).await.unwrap(), purchase);

        let mut sales = Vec::new();
        for amount in 1..=3 {
            let receipt = ledger
                .record_sale(sale(&customer.id, &[(&flour.id, amount)], 0))
                .await
                .unwrap();
            sales.push(receipt.record);
        }
        let stored = ledger.db().customer_purchases().for_owner(&customer.id).await.unwrap();
        assert_eq!(stored, sales);
        assert!(stored.windows(2).all(|w| w[0].date <= w[1].date));

        let payment = ledger
            .record_customer_payment(NewPayment::amount(&customer.id, Money::new(50)))
            .await
            .unwrap()
            .record;
        assert_eq!(ledger.db().customer_payments().require(&payment.id).await.unwrap(), payment);
        assert!(payment.date >= sales[2].date);
    }
}
