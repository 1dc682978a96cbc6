//! Read views: dashboard numbers, the monthly revenue report, owner detail
//! pages and name search.
//!
//! Everything here reads. Figures are computed fresh from the store on every
//! call, so they always match what the transaction path last committed.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use ombor_core::stats::{self, DashboardStats, MonthlyRevenue, RevenueLog};
use ombor_core::views::{filter_by_kind, on_day, search_by_name, Dated};
use ombor_core::{Customer, Factory, Payment, Product, ProductKind, Purchase, Sale};

use super::{DebtOwner, Ledger};
use crate::error::LedgerResult;

/// An owner with its transaction and payment history, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDetail<O, R> {
    pub owner: O,
    /// Purchases for a factory, sales for a customer.
    pub transactions: Vec<R>,
    pub payments: Vec<Payment>,
}

pub type FactoryDetail = OwnerDetail<Factory, Purchase>;
pub type CustomerDetail = OwnerDetail<Customer, Sale>;

impl Ledger {
    /// Counts, total debts and potential stock profit.
    ///
    /// `kind` narrows the profit figure to one product family.
    pub async fn dashboard(&self, kind: Option<ProductKind>) -> LedgerResult<DashboardStats> {
        let products = self.db.products().list().await?;
        let factories = self.db.factories().list().await?;
        let customers = self.db.customers().list().await?;
        Ok(stats::dashboard_stats(&products, &factories, &customers, kind))
    }

    /// Twelve monthly rows for `year`, from the transaction log.
    pub async fn monthly_revenue(&self, year: i32) -> LedgerResult<Vec<MonthlyRevenue>> {
        let sales = self.db.customer_purchases().list().await?;
        let purchases = self.db.factory_purchases().list().await?;
        let customer_payments = self.db.customer_payments().list().await?;
        let factory_payments = self.db.factory_payments().list().await?;

        Ok(stats::monthly_revenue(
            year,
            RevenueLog {
                sales: &sales,
                purchases: &purchases,
                customer_payments: &customer_payments,
                factory_payments: &factory_payments,
            },
        ))
    }

    pub async fn factory_detail(&self, factory_id: &str, day: Option<NaiveDate>) -> LedgerResult<FactoryDetail> {
        let owner: Factory = self.load_owner(factory_id).await?;
        let transactions = self.db.factory_purchases().for_owner(factory_id).await?;
        let payments = self.db.factory_payments().for_owner(factory_id).await?;
        Ok(detail(owner, transactions, payments, day))
    }

    pub async fn customer_detail(&self, customer_id: &str, day: Option<NaiveDate>) -> LedgerResult<CustomerDetail> {
        let owner: Customer = self.load_owner(customer_id).await?;
        let transactions = self.db.customer_purchases().for_owner(customer_id).await?;
        let payments = self.db.customer_payments().for_owner(customer_id).await?;
        Ok(detail(owner, transactions, payments, day))
    }

    /// All products, or only those of `kind`.
    pub async fn products(&self, kind: Option<ProductKind>) -> LedgerResult<Vec<Product>> {
        Ok(match kind {
            Some(kind) => self.db.products().by_kind(kind).await?,
            None => self.db.products().list().await?,
        })
    }

    /// Case-insensitive name search, optionally within one kind.
    pub async fn search_products(&self, query: &str, kind: Option<ProductKind>) -> LedgerResult<Vec<Product>> {
        let all = self.db.products().list().await?;
        let scoped: Vec<Product> = match kind {
            Some(kind) => filter_by_kind(&all, kind).into_iter().cloned().collect(),
            None => all,
        };
        let hits: Vec<Product> = search_by_name(&scoped, query).into_iter().cloned().collect();
        debug!(query = %query, hits = hits.len(), "Product search");
        Ok(hits)
    }

    pub async fn search_factories(&self, query: &str) -> LedgerResult<Vec<Factory>> {
        let all = self.db.factories().list().await?;
        Ok(search_by_name(&all, query).into_iter().cloned().collect())
    }

    pub async fn search_customers(&self, query: &str) -> LedgerResult<Vec<Customer>> {
        let all = self.db.customers().list().await?;
        Ok(search_by_name(&all, query).into_iter().cloned().collect())
    }
}

fn detail<O: DebtOwner, R: Dated + Clone>(
    owner: O,
    transactions: Vec<R>,
    payments: Vec<Payment>,
    day: Option<NaiveDate>,
) -> OwnerDetail<O, R> {
    let Some(day) = day else {
        return OwnerDetail {
            owner,
            transactions,
            payments,
        };
    };
    OwnerDetail {
        owner,
        transactions: on_day(&transactions, day).into_iter().cloned().collect(),
        payments: on_day(&payments, day).into_iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::LedgerError;
    use crate::service::catalog::ProductDraft;
    use crate::service::owners::{NewCustomer, NewFactory};
    use crate::service::transactions::{NewPayment, PurchaseProduct, PurchaseRequest, SaleRequest};
    use chrono::{Duration, TimeZone, Utc};
    use ombor_core::ledger::SaleLine;
    use ombor_core::{EntityKind, Money, Unit};
    use std::sync::Arc;

    fn draft(name: &str, kind: ProductKind, buy: i64, sell: i64, quantity: i64) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            kind,
            buy_price: Money::new(buy),
            sell_price: Money::new(sell),
            quantity,
            unit: Some(Unit::Piece),
        }
    }

    fn one_line(customer_id: &str, product_id: &str, amount: i64, paid: i64) -> SaleRequest {
        SaleRequest {
            customer_id: customer_id.to_string(),
            lines: vec![SaleLine {
                product_id: product_id.to_string(),
                amount,
                price: None,
            }],
            paid: Money::new(paid),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_dashboard_totals_and_kind_filter() {
        let ledger = Ledger::in_memory();
        ledger.add_product(draft("Un", ProductKind::Flour, 10, 13, 20)).await.unwrap();
        ledger.add_product(draft("Yog'", ProductKind::Oil, 30, 35, 2)).await.unwrap();
        let factory = ledger.create_factory(NewFactory::named("Un zavodi")).await.unwrap();
        ledger.create_customer(NewCustomer::named("Aziz")).await.unwrap();

        ledger
            .record_purchase(PurchaseRequest {
                factory_id: factory.id.clone(),
                product: PurchaseProduct::New {
                    name: "Tuz".to_string(),
                    kind: ProductKind::Salt,
                    unit: None,
                },
                amount: 5,
                buy_price: Money::new(4),
                sell_price: Money::new(6),
                paid: Money::new(5),
                idempotency_key: None,
            })
            .await
            .unwrap();

        let all = ledger.dashboard(None).await.unwrap();
        assert_eq!(all.product_count, 3);
        assert_eq!(all.factory_count, 1);
        assert_eq!(all.customer_count, 1);
        assert_eq!(all.total_factory_debt, Money::new(15));
        assert!(all.total_customer_debt.is_zero());
        assert_eq!(all.potential_profit, Money::new(60 + 10 + 10));

        let oil = ledger.dashboard(Some(ProductKind::Oil)).await.unwrap();
        assert_eq!(oil.potential_profit, Money::new(10));
        assert_eq!(oil.product_count, 3);
    }

    #[tokio::test]
    async fn test_monthly_revenue_from_log() {
        let clock = Arc::new(ManualClock::starting_at(Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()));
        let ledger = Ledger::in_memory().with_clock(clock.clone());
        let customer = ledger.create_customer(NewCustomer::named("Aziz")).await.unwrap();
        let product = ledger.add_product(draft("Un", ProductKind::Flour, 10, 15, 50)).await.unwrap();

        ledger.record_sale(one_line(&customer.id, &product.id, 4, 20)).await.unwrap();
        clock.set(Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap());
        ledger
            .record_customer_payment(NewPayment::amount(&customer.id, Money::new(40)))
            .await
            .unwrap();

        let rows = ledger.monthly_revenue(2024).await.unwrap();
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[2].income, Money::new(60));
        assert_eq!(rows[2].collected, Money::new(20));
        assert_eq!(rows[3].collected, Money::new(40));
        assert!(rows[3].income.is_zero());
        assert!(ledger.monthly_revenue(2023).await.unwrap().iter().all(|r| r.collected.is_zero()));
    }

    #[tokio::test]
    async fn test_customer_detail_by_day() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 23, 50, 0).unwrap();
        let clock = Arc::new(ManualClock::starting_at(start));
        let ledger = Ledger::in_memory().with_clock(clock.clone());
        let customer = ledger.create_customer(NewCustomer::named("Dilnoza")).await.unwrap();
        let product = ledger.add_product(draft("Non", ProductKind::Bakery, 2, 3, 100)).await.unwrap();

        ledger.record_sale(one_line(&customer.id, &product.id, 10, 0)).await.unwrap();
        clock.advance(Duration::minutes(20));
        ledger.record_sale(one_line(&customer.id, &product.id, 5, 0)).await.unwrap();
        ledger
            .record_customer_payment(NewPayment::amount(&customer.id, Money::new(10)))
            .await
            .unwrap();

        let detail = ledger.customer_detail(&customer.id, None).await.unwrap();
        assert_eq!(detail.owner.debt, Money::new(35));
        assert_eq!(detail.transactions.len(), 2);
        assert_eq!(detail.payments.len(), 1);

        let may_first = ledger
            .customer_detail(&customer.id, NaiveDate::from_ymd_opt(2024, 5, 1))
            .await
            .unwrap();
        assert_eq!(may_first.transactions.len(), 1);
        assert_eq!(may_first.transactions[0].total_price, Money::new(30));
        assert!(may_first.payments.is_empty());

        let may_second = ledger
            .customer_detail(&customer.id, NaiveDate::from_ymd_opt(2024, 5, 2))
            .await
            .unwrap();
        assert_eq!(may_second.transactions.len(), 1);
        assert_eq!(may_second.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_factory_detail_unknown_owner() {
        let ledger = Ledger::in_memory();
        let err = ledger.factory_detail("nope", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::OwnerNotFound { entity: EntityKind::Factory, .. }));
    }

    #[tokio::test]
    async fn test_search() {
        let ledger = Ledger::in_memory();
        ledger.add_product(draft("Un oliy nav", ProductKind::Flour, 10, 12, 1)).await.unwrap();
        ledger.add_product(draft("Un birinchi nav", ProductKind::Flour, 9, 11, 1)).await.unwrap();
        ledger.add_product(draft("Kungaboqar yog'i", ProductKind::Oil, 20, 25, 1)).await.unwrap();
        ledger.create_factory(NewFactory::named("Universal Un")).await.unwrap();
        ledger.create_factory(NewFactory::named("Tuz savdo")).await.unwrap();
        ledger.create_customer(NewCustomer::named("Aziz")).await.unwrap();

        assert_eq!(ledger.search_products("UN", None).await.unwrap().len(), 3);
        assert_eq!(ledger.search_products("nav", Some(ProductKind::Flour)).await.unwrap().len(), 2);
        assert!(ledger.search_products("nav", Some(ProductKind::Oil)).await.unwrap().is_empty());
        assert_eq!(ledger.search_products("  ", Some(ProductKind::Oil)).await.unwrap().len(), 1);

        let factories = ledger.search_factories("un").await.unwrap();
        assert_eq!(factories.len(), 1);
        assert_eq!(factories[0].name, "Universal Un");
        assert_eq!(ledger.search_customers("").await.unwrap().len(), 1);

        assert_eq!(ledger.products(Some(ProductKind::Flour)).await.unwrap().len(), 2);
        assert_eq!(ledger.products(None).await.unwrap().len(), 3);
    }
}
