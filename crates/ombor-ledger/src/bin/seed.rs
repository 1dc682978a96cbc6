//! # Seed Data Generator
//!
//! Populates a ledger with sample factories, customers and a few months of
//! purchases, sales and payments, then prints the dashboard, the monthly
//! revenue report and a reconciliation report.
//!
//! ## Usage
//! ```bash
//! # Seed the configured store (platform data dir by default)
//! cargo run -p ombor-ledger --bin seed
//!
//! # Seed a specific SQLite file
//! cargo run -p ombor-ledger --bin seed -- --db ./data/ombor.db
//!
//! # Dry run against an in-memory store
//! cargo run -p ombor-ledger --bin seed -- --memory --months 12
//! ```
//!
//! ## Generated Data
//! - One factory per product family (flour, oil, salt, bakery), each with an
//!   opening purchase of a new product
//! - Three customers buying every month, paying part at checkout
//! - Monthly restocks, customer payments, and a full factory settlement
//!   every third month
//!
//! Record dates come from a manual clock starting 5 January 2024, so runs
//! are repeatable.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use ombor_core::ledger::SaleLine;
use ombor_core::{Money, ProductKind, Unit};
use ombor_ledger::{
    telemetry, Ledger, LedgerConfig, ManualClock, NewCustomer, NewFactory, NewPayment,
    PurchaseProduct, PurchaseRequest, SaleRequest, StoreBackend,
};

/// Factory name, phone, product name, kind, unit, buy price, sell price.
const FACTORIES: &[(&str, &str, &str, ProductKind, Unit, i64, i64)] = &[
    ("Un zavodi", "+998 71 200 11 22", "Un oliy nav 50kg", ProductKind::Flour, Unit::Sack, 320_000, 345_000),
    ("Yog' zavodi", "+998 71 200 33 44", "Kungaboqar yog'i 5L", ProductKind::Oil, Unit::Piece, 88_000, 97_000),
    ("Tuz kombinati", "+998 65 220 10 10", "Osh tuzi 1kg", ProductKind::Salt, Unit::Kg, 2_500, 3_500),
    ("Non sexi", "+998 71 150 70 70", "Patir non", ProductKind::Bakery, Unit::Piece, 4_000, 5_000),
];

/// Customer name and location.
const CUSTOMERS: &[(&str, &str)] = &[
    ("Aziz do'kon", "Chorsu bozori"),
    ("Dilnoza market", "Yunusobod 4"),
    ("Oila choyxonasi", "Chilonzor 9"),
];

const OPENING_STOCK: i64 = 120;
const MONTHLY_RESTOCK: i64 = 40;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut memory = false;
    let mut months: u32 = 6;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--months" | "-n" => {
                if i + 1 < args.len() {
                    months = args[i + 1].parse().unwrap_or(6).clamp(1, 12);
                    i += 1;
                }
            }
            "--memory" | "-m" => memory = true,
            "--help" | "-h" => {
                println!("Ombor Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       SQLite file to seed");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -m, --memory          Use an in-memory store");
                println!("  -n, --months <N>      Months of activity, 1-12 (default: 6)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path.as_deref())?;
    if memory {
        config.store.backend = StoreBackend::Memory;
    } else if let Some(path) = db_path {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(path);
    }
    telemetry::init_tracing(&config.logging);

    println!("🌱 Ombor Seed Data Generator");
    println!("============================");
    println!("Store:  {}", config.store.backend);
    if config.store.backend == StoreBackend::Sqlite {
        println!("File:   {}", config.store.database_path()?.display());
    }
    println!("Months: {}", months);
    println!();

    let start = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).single().ok_or("invalid start date")?;
    let clock = Arc::new(ManualClock::starting_at(start));
    let ledger = Ledger::open(&config).await?.with_clock(clock.clone());
    println!("✓ Store ready");

    let existing = ledger.db().factories().list().await?.len();
    if existing > 0 {
        println!("⚠ Store already has {} factories", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Owners and opening stock
    let mut factories = Vec::new();
    for &(name, phone, product, kind, unit, buy, sell) in FACTORIES {
        let factory = ledger
            .create_factory(NewFactory {
                name: name.to_string(),
                phone: Some(phone.to_string()),
                address: None,
            })
            .await?;
        let receipt = ledger
            .record_purchase(PurchaseRequest {
                factory_id: factory.id.clone(),
                product: PurchaseProduct::New {
                    name: product.to_string(),
                    kind,
                    unit: Some(unit),
                },
                amount: OPENING_STOCK,
                buy_price: Money::new(buy),
                sell_price: Money::new(sell),
                paid: Money::new(buy * OPENING_STOCK / 2),
                idempotency_key: Some(format!("seed-open-{}", factory.id)),
            })
            .await?;
        factories.push((factory.id, receipt.record.product_id, buy, sell));
    }
    println!("✓ Created {} factories with opening stock", factories.len());

    let mut customers = Vec::new();
    for &(name, location) in CUSTOMERS {
        let customer = ledger
            .create_customer(NewCustomer {
                name: name.to_string(),
                phone: None,
                location: Some(location.to_string()),
            })
            .await?;
        customers.push(customer.id);
    }
    println!("✓ Created {} customers", customers.len());

    // Monthly activity
    let mut transactions = 0usize;
    for month in 0..months {
        clock.set(start + Duration::days(1 + 30 * i64::from(month)));

        for (c, customer_id) in customers.iter().enumerate() {
            let m = month as usize;
            let first = &factories[(c + m) % factories.len()];
            let second = &factories[(c + m + 1) % factories.len()];
            let a = 2 + c as i64;
            let b = 1 + (m % 3) as i64;
            let total = a * first.3 + b * second.3;

            ledger
                .record_sale(SaleRequest {
                    customer_id: customer_id.clone(),
                    lines: vec![
                        SaleLine {
                            product_id: first.1.clone(),
                            amount: a,
                            price: None,
                        },
                        SaleLine {
                            product_id: second.1.clone(),
                            amount: b,
                            price: None,
                        },
                    ],
                    paid: Money::new(total * (c as i64 + 1) / 4),
                    idempotency_key: Some(format!("seed-sale-{}-{}", month, customer_id)),
                })
                .await?;
            transactions += 1;

            clock.advance(Duration::days(3));
            let debt = ledger.db().customers().require(customer_id).await?.debt;
            if debt.is_positive() {
                ledger
                    .record_customer_payment(
                        NewPayment::amount(customer_id, Money::new((debt.amount() / 3).max(1)))
                            .with_key(format!("seed-cpay-{}-{}", month, customer_id)),
                    )
                    .await?;
                transactions += 1;
            }
        }

        for (f, (factory_id, product_id, buy, sell)) in factories.iter().enumerate() {
            clock.advance(Duration::days(1));
            let cost = buy * MONTHLY_RESTOCK;
            let paid = if (month as usize + f) % 2 == 0 { cost } else { cost / 4 };
            ledger
                .record_purchase(PurchaseRequest {
                    factory_id: factory_id.clone(),
                    product: PurchaseProduct::Existing {
                        product_id: product_id.clone(),
                    },
                    amount: MONTHLY_RESTOCK,
                    buy_price: Money::new(*buy),
                    sell_price: Money::new(*sell),
                    paid: Money::new(paid),
                    idempotency_key: Some(format!("seed-restock-{}-{}", month, factory_id)),
                })
                .await?;
            transactions += 1;

            if month % 3 == 2 {
                ledger
                    .record_factory_payment(
                        NewPayment::full(factory_id)
                            .with_note("Quarterly settlement")
                            .with_key(format!("seed-fpay-{}-{}", month, factory_id)),
                    )
                    .await?;
                transactions += 1;
            }
        }
        println!("  Month {:>2}: done", month + 1);
    }
    println!("✓ Recorded {} transactions", transactions);

    // Reports
    println!();
    println!("Dashboard:");
    println!("{}", serde_json::to_string_pretty(&ledger.dashboard(None).await?)?);

    println!();
    println!("Monthly revenue (2024):");
    for row in ledger.monthly_revenue(2024).await? {
        if row.income.is_zero() && row.cost.is_zero() {
            continue;
        }
        println!(
            "  {:>2}  income {:>12}  cost {:>12}  net {:>12}",
            row.month,
            row.income.amount(),
            row.cost.amount(),
            row.net.amount()
        );
    }

    println!();
    let report = ledger.reconcile().await?;
    println!("Reconciliation:");
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.is_clean() {
        println!("✓ Stored debts match the transaction history");
    } else {
        println!("⚠ {} owners drifted", report.drifted().count());
    }

    println!();
    println!("✓ Seed complete!");
    Ok(())
}
