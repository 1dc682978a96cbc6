//! # Product Catalogue
//!
//! Adding and editing products directly, outside of a purchase.
//!
//! Purchases and sales move stock through the transaction path. Edits here
//! are guarded on the quantity that was read, so an edit never silently
//! overwrites a sale that landed in between.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use ombor_core::validation::{validate_id, validate_name, validate_price, validate_stock_level};
use ombor_core::{EntityKind, Money, Product, ProductKind, Unit};
use ombor_db::repository::encode;
use ombor_db::{DbError, WriteBatch};

use super::{stock_patch, Ledger};
use crate::error::{LedgerError, LedgerResult};

/// A product added by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub buy_price: Money,
    pub sell_price: Money,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default, rename = "amountType")]
    pub unit: Option<Unit>,
}

/// Changes to an existing product. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<ProductKind>,
    #[serde(default)]
    pub buy_price: Option<Money>,
    #[serde(default)]
    pub sell_price: Option<Money>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default, rename = "amountType")]
    pub unit: Option<Unit>,
}

fn validate_product(product: &Product) -> LedgerResult<()> {
    validate_name("name", &product.name)?;
    validate_price("buyPrice", product.buy_price, false)?;
    validate_price("sellPrice", product.sell_price, true)?;
    validate_stock_level(product.quantity)?;
    Ok(())
}

impl Ledger {
    pub async fn add_product(&self, draft: ProductDraft) -> LedgerResult<Product> {
        let product = Product {
            id: String::new(),
            name: draft.name.trim().to_string(),
            kind: draft.kind,
            buy_price: draft.buy_price,
            sell_price: draft.sell_price,
            quantity: draft.quantity,
            unit: draft.unit,
            created_at: self.now(),
            updated_at: None,
        };
        validate_product(&product)?;

        let id = self.db.products().create(product.clone()).await?;
        info!(product_id = %id, name = %product.name, kind = %product.kind, "Product added");
        Ok(Product { id, ..product })
    }

    /// Applies an edit. Fails with `Conflict` if the quantity changed since
    /// the product was read.
    pub async fn edit_product(&self, product_id: &str, edit: ProductEdit) -> LedgerResult<Product> {
        validate_id("productId", product_id)?;
        let current = self
            .db
            .products()
            .get(product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(EntityKind::Product, product_id))?;

        let now = self.now();
        let mut updated = current.clone();
        if let Some(name) = edit.name {
            updated.name = name.trim().to_string();
        }
        if let Some(kind) = edit.kind {
            updated.kind = kind;
        }
        if let Some(price) = edit.buy_price {
            updated.buy_price = price;
        }
        if let Some(price) = edit.sell_price {
            updated.sell_price = price;
        }
        if let Some(quantity) = edit.quantity {
            updated.quantity = quantity;
        }
        if edit.unit.is_some() {
            updated.unit = edit.unit;
        }
        updated.updated_at = Some(now);
        validate_product(&updated)?;

        let fields = changed_fields(&current, &updated)?;
        let op = stock_patch(product_id, current.quantity, fields, now);
        match self.store().commit(WriteBatch { ops: vec![op] }).await {
            Ok(()) => {}
            Err(DbError::Conflict { .. }) => {
                return Err(LedgerError::Conflict(format!(
                    "product {} changed while it was being edited",
                    product_id
                )))
            }
            Err(e) => return Err(e.into()),
        }

        info!(product_id = %product_id, quantity = updated.quantity, "Product edited");
        Ok(updated)
    }
}

/// Top-level fields whose encoded value differs.
fn changed_fields(before: &Product, after: &Product) -> LedgerResult<Map<String, Value>> {
    let (Value::Object(old), Value::Object(new)) = (encode(before)?, encode(after)?) else {
        return Err(LedgerError::Internal("product did not encode as an object".to_string()));
    };
    Ok(new
        .into_iter()
        .filter(|(key, value)| key != "id" && old.get(key) != Some(value))
        .collect())
}
