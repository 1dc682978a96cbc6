//! # Transaction History
//!
//! Immutable transaction records: purchases, sales and payments.
//!
//! ```text
//!   factoryPurchases   Repository<Purchase>   for_owner(factory_id)
//!   customerPurchases  Repository<Sale>       for_owner(customer_id)
//!   factoryPayments  ┐
//!   customerPayments ┴ Repository<Payment>    for_owner(owner_id)
//! ```
//!
//! These collections are append-only. Nothing here patches a record.

use ombor_core::{Payment, Purchase, Sale};

use super::{Record, Repository};
use crate::error::DbResult;

impl Record for Purchase {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Sale {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Record for Payment {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Repository<Purchase> {
    /// Purchases from one factory, oldest first.
    pub async fn for_owner(&self, factory_id: &str) -> DbResult<Vec<Purchase>> {
        let mut records: Vec<Purchase> = self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.factory_id == factory_id)
            .collect();
        records.sort_by_key(|p| p.date);
        Ok(records)
    }
}

impl Repository<Sale> {
    /// Sales to one customer, oldest first.
    pub async fn for_owner(&self, customer_id: &str) -> DbResult<Vec<Sale>> {
        let mut records: Vec<Sale> = self
            .list()
            .await?
            .into_iter()
            .filter(|s| s.customer_id == customer_id)
            .collect();
        records.sort_by_key(|s| s.date);
        Ok(records)
    }
}

impl Repository<Payment> {
    /// Payments for one owner, oldest first.
    pub async fn for_owner(&self, owner_id: &str) -> DbResult<Vec<Payment>> {
        let mut records: Vec<Payment> = self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.owner_id == owner_id)
            .collect();
        records.sort_by_key(|p| p.date);
        Ok(records)
    }
}
