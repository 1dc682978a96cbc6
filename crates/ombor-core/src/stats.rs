//! # Dashboard and Revenue Aggregation
//!
//! Read-only numbers shown on the dashboard and the revenue page. All of it
//! is computed from records passed in; nothing is cached or stored.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Customer, Factory, Payment, Product, ProductKind, Purchase, Sale};

// =============================================================================
// Dashboard
// =============================================================================

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub product_count: usize,
    pub customer_count: usize,
    pub factory_count: usize,
    /// What we owe all factories.
    pub total_factory_debt: Money,
    /// What all customers owe us.
    pub total_customer_debt: Money,
    /// Profit if the current stock sold at current prices.
    pub potential_profit: Money,
}

/// Builds the dashboard numbers. `kind` narrows the profit figure only.
pub fn dashboard_stats(
    products: &[Product],
    factories: &[Factory],
    customers: &[Customer],
    kind: Option<ProductKind>,
) -> DashboardStats {
    DashboardStats {
        product_count: products.len(),
        customer_count: customers.len(),
        factory_count: factories.len(),
        total_factory_debt: factories.iter().map(|f| f.debt).sum(),
        total_customer_debt: customers.iter().map(|c| c.debt).sum(),
        potential_profit: inventory_profit(products, kind),
    }
}

/// `Σ (sellPrice − buyPrice) × quantity`, optionally for one kind.
///
/// ## Example
/// ```rust
/// use chrono::Utc;
/// use ombor_core::stats::inventory_profit;
/// use ombor_core::{Money, Product, ProductKind};
///
/// let flour = Product {
///     id: "p1".into(),
///     name: "Flour".into(),
///     kind: ProductKind::Flour,
///     buy_price: Money::new(10),
///     sell_price: Money::new(13),
///     quantity: 20,
///     unit: None,
///     created_at: Utc::now(),
///     updated_at: None,
/// };
/// assert_eq!(inventory_profit(&[flour.clone()], None), Money::new(60));
/// assert_eq!(inventory_profit(&[flour], Some(ProductKind::Oil)), Money::zero());
/// ```
pub fn inventory_profit(products: &[Product], kind: Option<ProductKind>) -> Money {
    let total = products
        .iter()
        .filter(|p| kind.map_or(true, |k| p.kind == k))
        .fold(0i64, |acc, p| {
            acc.saturating_add(p.unit_margin().amount().saturating_mul(p.quantity))
        });
    Money::new(total)
}

// =============================================================================
// Monthly Revenue
// =============================================================================

/// One month of the revenue report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    /// 1 = January.
    pub month: u32,
    /// Value of goods sold.
    pub income: Money,
    /// Value of goods bought.
    pub cost: Money,
    pub net: Money,
    /// Cash received: paid at checkout plus customer payments.
    pub collected: Money,
    /// Cash sent: paid at purchase plus factory payments.
    pub paid_out: Money,
}

/// Transaction log for the revenue report.
#[derive(Debug, Clone, Copy)]
pub struct RevenueLog<'a> {
    pub sales: &'a [Sale],
    pub purchases: &'a [Purchase],
    pub customer_payments: &'a [Payment],
    pub factory_payments: &'a [Payment],
}

/// Twelve rows, January to December, for `year` (UTC months).
pub fn monthly_revenue(year: i32, log: RevenueLog<'_>) -> Vec<MonthlyRevenue> {
    let mut rows: Vec<MonthlyRevenue> = (1..=12)
        .map(|month| MonthlyRevenue {
            month,
            income: Money::zero(),
            cost: Money::zero(),
            net: Money::zero(),
            collected: Money::zero(),
            paid_out: Money::zero(),
        })
        .collect();

    let slot = |date: &chrono::DateTime<chrono::Utc>| -> Option<usize> {
        (date.year() == year).then(|| date.month0() as usize)
    };

    for sale in log.sales {
        if let Some(i) = slot(&sale.date) {
            rows[i].income = rows[i].income.saturating_add(sale.total_price);
            rows[i].collected = rows[i].collected.saturating_add(sale.paid);
        }
    }
    for purchase in log.purchases {
        if let Some(i) = slot(&purchase.date) {
            rows[i].cost = rows[i].cost.saturating_add(purchase.obligation());
            rows[i].paid_out = rows[i].paid_out.saturating_add(purchase.paid);
        }
    }
    for payment in log.customer_payments {
        if let Some(i) = slot(&payment.date) {
            rows[i].collected = rows[i].collected.saturating_add(payment.amount);
        }
    }
    for payment in log.factory_payments {
        if let Some(i) = slot(&payment.date) {
            rows[i].paid_out = rows[i].paid_out.saturating_add(payment.amount);
        }
    }

    for row in &mut rows {
        row.net = row.income.saturating_sub(row.cost);
    }
    rows
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Settlement;
    use chrono::{DateTime, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn product(kind: ProductKind, buy: i64, sell: i64, qty: i64) -> Product {
        Product {
            id: format!("{kind}-{buy}"),
            name: kind.to_string(),
            kind,
            buy_price: Money::new(buy),
            sell_price: Money::new(sell),
            quantity: qty,
            unit: None,
            created_at: date(2024, 1, 1),
            updated_at: None,
        }
    }

    fn factory(debt: i64) -> Factory {
        Factory {
            id: format!("f{debt}"),
            name: "F".into(),
            phone: None,
            address: None,
            debt: Money::new(debt),
            created_at: date(2024, 1, 1),
        }
    }

    fn customer(debt: i64) -> Customer {
        Customer {
            id: format!("c{debt}"),
            name: "C".into(),
            phone: None,
            location: None,
            debt: Money::new(debt),
            created_at: date(2024, 1, 1),
        }
    }

    fn sale(total: i64, paid: i64, at: DateTime<Utc>) -> Sale {
        Sale {
            id: "s".into(),
            customer_id: "c".into(),
            items: vec![],
            total_price: Money::new(total),
            paid: Money::new(paid),
            debt_left: Money::new((total - paid).max(0)),
            date: at,
        }
    }

    fn purchase(paid: i64, debt_left: i64, at: DateTime<Utc>) -> Purchase {
        Purchase {
            id: "p".into(),
            factory_id: "f".into(),
            product_id: "x".into(),
            product_name: "x".into(),
            product_type: ProductKind::Salt,
            buy_price: Money::new(1),
            sell_price: Money::new(1),
            amount: paid + debt_left,
            amount_type: None,
            paid: Money::new(paid),
            debt_left: Money::new(debt_left),
            date: at,
        }
    }

    fn payment(amount: i64, at: DateTime<Utc>) -> Payment {
        Payment {
            id: "pay".into(),
            owner_id: "o".into(),
            amount: Money::new(amount),
            note: String::new(),
            settlement: Settlement::Partial,
            date: at,
        }
    }

    #[test]
    fn test_dashboard_totals() {
        let products = vec![
            product(ProductKind::Flour, 10, 15, 10),
            product(ProductKind::Oil, 20, 22, 5),
        ];
        let factories = vec![factory(400), factory(100)];
        let customers = vec![customer(250)];

        let stats = dashboard_stats(&products, &factories, &customers, None);
        assert_eq!(stats.product_count, 2);
        assert_eq!(stats.factory_count, 2);
        assert_eq!(stats.customer_count, 1);
        assert_eq!(stats.total_factory_debt, Money::new(500));
        assert_eq!(stats.total_customer_debt, Money::new(250));
        assert_eq!(stats.potential_profit, Money::new(60));

        let oil_only = dashboard_stats(&products, &factories, &customers, Some(ProductKind::Oil));
        assert_eq!(oil_only.potential_profit, Money::new(10));
    }

    #[test]
    fn test_monthly_revenue_buckets() {
        let sales = vec![
            sale(1500, 1000, date(2024, 3, 2)),
            sale(200, 200, date(2024, 3, 20)),
            sale(999, 0, date(2023, 3, 2)),
        ];
        let purchases = vec![purchase(600, 400, date(2024, 3, 1)), purchase(50, 0, date(2024, 7, 1))];
        let customer_payments = vec![payment(300, date(2024, 4, 5))];
        let factory_payments = vec![payment(400, date(2024, 3, 31))];

        let rows = monthly_revenue(
            2024,
            RevenueLog {
                sales: &sales,
                purchases: &purchases,
                customer_payments: &customer_payments,
                factory_payments: &factory_payments,
            },
        );

        assert_eq!(rows.len(), 12);
        let march = &rows[2];
        assert_eq!(march.month, 3);
        assert_eq!(march.income, Money::new(1700));
        assert_eq!(march.cost, Money::new(1000));
        assert_eq!(march.net, Money::new(700));
        assert_eq!(march.collected, Money::new(1200));
        assert_eq!(march.paid_out, Money::new(1000));

        assert_eq!(rows[3].collected, Money::new(300));
        assert_eq!(rows[6].net, Money::new(-50));
        assert!(rows[0].income.is_zero());
    }

    #[test]
    fn test_totals_saturate_on_huge_values() {
        let factories = vec![factory(i64::MAX), factory(1)];
        let customers = vec![customer(i64::MAX - 1), customer(5)];
        let stats = dashboard_stats(&[], &factories, &customers, None);
        assert_eq!(stats.total_factory_debt, Money::new(i64::MAX));
        assert_eq!(stats.total_customer_debt, Money::new(i64::MAX));

        let sales = vec![sale(i64::MAX, 0, date(2024, 5, 1)), sale(10, 10, date(2024, 5, 2))];
        let purchases = vec![purchase(0, i64::MAX, date(2024, 6, 1))];
        let rows = monthly_revenue(
            2024,
            RevenueLog {
                sales: &sales,
                purchases: &purchases,
                customer_payments: &[],
                factory_payments: &[],
            },
        );
        assert_eq!(rows[4].income, Money::new(i64::MAX));
        assert_eq!(rows[5].net, Money::new(-i64::MAX));
    }
}
