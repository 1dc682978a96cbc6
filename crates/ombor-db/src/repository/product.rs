//! # Product Repository
//!
//! Warehouse stock records in the `products` collection.
//!
//! ## Key Operations
//! - List / get / insert through [`Repository`]
//! - Filter by product kind
//! - Load the products a sale touches in one pass

use std::collections::HashMap;

use tracing::debug;

use super::{Record, Repository};
use crate::error::DbResult;
use ombor_core::{Product, ProductKind};

impl Record for Product {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Repository<Product> {
    /// Products of one kind, in insertion order.
    pub async fn by_kind(&self, kind: ProductKind) -> DbResult<Vec<Product>> {
        let products: Vec<Product> = self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect();
        debug!(kind = %kind, count = products.len(), "Products by kind");
        Ok(products)
    }

    /// Loads the given products keyed by id. Unknown ids are left out.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let stock = db.products().by_ids(["a", "b"]).await?;
    /// let plan = ledger::record_sale(debt, &lines, &stock, paid, record)?;
    /// ```
    pub async fn by_ids<'a, I>(&self, ids: I) -> DbResult<HashMap<String, Product>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut found = HashMap::new();
        for id in ids {
            if found.contains_key(id) {
                continue;
            }
            if let Some(product) = self.get(id).await? {
                found.insert(product.id.clone(), product);
            }
        }
        Ok(found)
    }
}
