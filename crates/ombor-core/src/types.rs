//! # Domain Types
//!
//! Core domain types used throughout Ombor.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Factory      │   │    Product      │   │    Customer     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  id             │       │
//! │  │  name, phone    │   │  kind, unit     │   │  name, phone    │       │
//! │  │  address        │   │  buy/sell price │   │  location       │       │
//! │  │  debt ≥ 0       │   │  quantity ≥ 0   │   │  debt ≥ 0       │       │
//! │  └────────┬────────┘   └────────┬────────┘   └────────┬────────┘       │
//! │           │                     │                     │                 │
//! │  ┌────────▼────────┐            │            ┌────────▼────────┐       │
//! │  │    Purchase     │◄───────────┴───────────►│      Sale       │       │
//! │  │  (immutable)    │                         │  (immutable)    │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐  Payment is shared by both sides: it lives in     │
//! │  │    Payment      │  factoryPayments or customerPayments and points   │
//! │  │  (immutable)    │  at its owner by id.                              │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Shape
//! Records are stored as camelCase JSON documents. A few fields keep the
//! names the dashboard has always used (`type`, `amountType`). Optional
//! fields are `Option` here and are never assumed present downstream.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product Kind
// =============================================================================

/// The four product families the warehouse stocks.
///
/// Older documents carry the shop's own labels ("Un", "Yog'", "Tuz",
/// "Novvoylar maxsuloti"); those are accepted on read and by `FromStr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[serde(alias = "Un")]
    Flour,
    #[serde(alias = "Yog'", alias = "Yog‘")]
    Oil,
    #[serde(alias = "Tuz")]
    Salt,
    #[serde(alias = "Novvoylar maxsuloti")]
    Bakery,
}

impl ProductKind {
    /// Every kind, in display order.
    pub const ALL: [ProductKind; 4] = [
        ProductKind::Flour,
        ProductKind::Oil,
        ProductKind::Salt,
        ProductKind::Bakery,
    ];

    /// Returns the canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Flour => "flour",
            ProductKind::Oil => "oil",
            ProductKind::Salt => "salt",
            ProductKind::Bakery => "bakery",
        }
    }
}

impl fmt::Display for ProductKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "flour" | "Flour" | "Un" => Ok(ProductKind::Flour),
            "oil" | "Oil" | "Yog'" | "Yog‘" => Ok(ProductKind::Oil),
            "salt" | "Salt" | "Tuz" => Ok(ProductKind::Salt),
            "bakery" | "Bakery" | "Novvoylar maxsuloti" => Ok(ProductKind::Bakery),
            other => Err(ValidationError::InvalidFormat {
                field: "type".to_string(),
                reason: format!("unknown product type '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Unit
// =============================================================================

/// Unit a product quantity is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(alias = "dona")]
    Piece,
    #[serde(alias = "qop")]
    Sack,
    Kg,
}

impl Unit {
    /// Returns the canonical string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Piece => "piece",
            Unit::Sack => "sack",
            Unit::Kg => "kg",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "piece" | "dona" => Ok(Unit::Piece),
            "sack" | "qop" => Ok(Unit::Sack),
            "kg" => Ok(Unit::Kg),
            other => Err(ValidationError::InvalidFormat {
                field: "amountType".to_string(),
                reason: format!("unknown unit '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product held in the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Product family.
    #[serde(rename = "type")]
    pub kind: ProductKind,

    /// Price paid to the factory per unit.
    pub buy_price: Money,

    /// Price charged to customers per unit.
    pub sell_price: Money,

    /// Units currently in stock. Never negative.
    pub quantity: i64,

    /// Unit of measure, absent on some older documents.
    #[serde(rename = "amountType", default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Checks whether `quantity` units can be taken from stock.
    #[inline]
    pub fn can_supply(&self, quantity: i64) -> bool {
        quantity <= self.quantity
    }

    /// Margin on a single unit. May be negative if sold below cost.
    #[inline]
    pub fn unit_margin(&self) -> Money {
        self.sell_price - self.buy_price
    }
}

// =============================================================================
// Owners
// =============================================================================

/// A supplier we buy goods from. `debt` is what we still owe them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Factory {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub debt: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A customer we sell goods to. `debt` is what they still owe us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub debt: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Purchase
// =============================================================================

/// Goods bought from a factory. Created once, never changed.
///
/// `paid + debt_left` always equals the obligation `amount × buy_price`,
/// because `paid` is clamped to the obligation when it is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: String,
    pub factory_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_type: ProductKind,
    pub buy_price: Money,
    pub sell_price: Money,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_type: Option<Unit>,
    pub paid: Money,
    pub debt_left: Money,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

impl Purchase {
    /// Total value of the goods on this purchase.
    #[inline]
    pub fn obligation(&self) -> Money {
        self.paid.saturating_add(self.debt_left)
    }
}

// =============================================================================
// Sale
// =============================================================================

/// One product line on a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub product_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub price: Money,
    pub amount: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub line_total: Money,
}

/// A checkout to a customer. Created once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub customer_id: String,
    pub items: Vec<SaleItem>,
    pub total_price: Money,
    pub paid: Money,
    pub debt_left: Money,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

/// Whether a payment was meant to clear the whole debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Settlement {
    Partial,
    Full,
}

impl Settlement {
    /// Note written on the payment when the caller gives none.
    pub fn default_note(&self) -> &'static str {
        match self {
            Settlement::Partial => "Partial payment",
            Settlement::Full => "Full payment",
        }
    }
}

/// A debt payment to a factory or from a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub owner_id: String,
    pub amount: Money,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_settlement")]
    pub settlement: Settlement,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
}

fn default_settlement() -> Settlement {
    Settlement::Partial
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_product_kind_accepts_shop_labels() {
        assert_eq!("Un".parse::<ProductKind>().unwrap(), ProductKind::Flour);
        assert_eq!("Yog'".parse::<ProductKind>().unwrap(), ProductKind::Oil);
        assert_eq!("Tuz".parse::<ProductKind>().unwrap(), ProductKind::Salt);
        assert_eq!(
            "Novvoylar maxsuloti".parse::<ProductKind>().unwrap(),
            ProductKind::Bakery
        );
        assert!("rice".parse::<ProductKind>().is_err());
    }

    #[test]
    fn test_unit_accepts_shop_labels() {
        assert_eq!("dona".parse::<Unit>().unwrap(), Unit::Piece);
        assert_eq!("qop".parse::<Unit>().unwrap(), Unit::Sack);
        assert_eq!("kg".parse::<Unit>().unwrap(), Unit::Kg);
    }

    #[test]
    fn test_product_wire_shape() {
        let product = Product {
            id: "p1".to_string(),
            name: "Flour 50kg".to_string(),
            kind: ProductKind::Flour,
            buy_price: Money::new(10),
            sell_price: Money::new(12),
            quantity: 100,
            unit: Some(Unit::Sack),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
            updated_at: None,
        };

        let json = serde_json::to_value(&product).unwrap();
        assert_eq!(json["type"], "flour");
        assert_eq!(json["amountType"], "sack");
        assert_eq!(json["buyPrice"], 10);
        assert!(json.get("updatedAt").is_none());

        let back: Product = serde_json::from_value(json).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn test_legacy_document_decodes() {
        let json = serde_json::json!({
            "id": "c1",
            "name": "Bakery on the corner",
            "createdAt": "2024-03-01T09:00:00Z"
        });
        let customer: Customer = serde_json::from_value(json).unwrap();
        assert_eq!(customer.debt, Money::zero());
        assert!(customer.location.is_none());

        let product: Product = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "name": "Sunflower oil",
            "type": "Yog'",
            "buyPrice": 5,
            "sellPrice": 7,
            "quantity": 3,
            "amountType": "dona",
            "createdAt": "2024-03-01T09:00:00Z"
        }))
        .unwrap();
        assert_eq!(product.kind, ProductKind::Oil);
        assert_eq!(product.unit, Some(Unit::Piece));
    }

    #[test]
    fn test_purchase_obligation() {
        let purchase = Purchase {
            id: "x".to_string(),
            factory_id: "f".to_string(),
            product_id: "p".to_string(),
            product_name: "Salt".to_string(),
            product_type: ProductKind::Salt,
            buy_price: Money::new(10),
            sell_price: Money::new(15),
            amount: 100,
            amount_type: None,
            paid: Money::new(600),
            debt_left: Money::new(400),
            date: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        };
        assert_eq!(purchase.obligation(), Money::new(1000));
    }

    #[test]
    fn test_settlement_notes() {
        assert_eq!(Settlement::Full.default_note(), "Full payment");
        assert_eq!(Settlement::Partial.default_note(), "Partial payment");
    }
}
