//! List and detail view helpers: name search, kind filter, day filter.

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{Customer, Factory, Payment, Product, ProductKind, Purchase, Sale};

/// Records that have a display name.
pub trait Named {
    fn name(&self) -> &str;
}

/// Records that happened at a point in time.
pub trait Dated {
    fn date(&self) -> DateTime<Utc>;
}

macro_rules! impl_named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

macro_rules! impl_dated {
    ($($ty:ty),*) => {
        $(impl Dated for $ty {
            fn date(&self) -> DateTime<Utc> {
                self.date
            }
        })*
    };
}

impl_named!(Product, Factory, Customer);
impl_dated!(Purchase, Sale, Payment);

/// Case-insensitive substring match on the name. A blank query keeps all.
///
/// ```rust
/// use ombor_core::views::{search_by_name, Named};
///
/// struct N(&'static str);
/// impl Named for N {
///     fn name(&self) -> &str { self.0 }
/// }
///
/// let all = [N("Un zavodi"), N("Tuz savdo"), N("UNIVERSAL")];
/// let hits = search_by_name(&all, "un");
/// assert_eq!(hits.len(), 2);
/// ```
pub fn search_by_name<'a, T: Named>(items: &'a [T], query: &str) -> Vec<&'a T> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items.iter().collect();
    }
    items
        .iter()
        .filter(|item| item.name().to_lowercase().contains(&needle))
        .collect()
}

/// Products of one kind.
pub fn filter_by_kind(products: &[Product], kind: ProductKind) -> Vec<&Product> {
    products.iter().filter(|p| p.kind == kind).collect()
}

/// Records dated on `day` (UTC calendar day).
pub fn on_day<T: Dated>(items: &[T], day: NaiveDate) -> Vec<&T> {
    items.iter().filter(|item| item.date().date_naive() == day).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::Settlement;
    use chrono::TimeZone;

    fn product(name: &str, kind: ProductKind) -> Product {
        Product {
            id: name.to_string(),
            name: name.to_string(),
            kind,
            buy_price: Money::new(1),
            sell_price: Money::new(2),
            quantity: 1,
            unit: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_search_and_kind_filter() {
        let products = vec![
            product("Flour Premium", ProductKind::Flour),
            product("flour first grade", ProductKind::Flour),
            product("Sunflower oil", ProductKind::Oil),
        ];

        assert_eq!(search_by_name(&products, "FLOUR").len(), 3);
        assert_eq!(search_by_name(&products, "premium").len(), 1);
        assert_eq!(search_by_name(&products, "  ").len(), 3);
        assert_eq!(filter_by_kind(&products, ProductKind::Oil).len(), 1);
        assert!(filter_by_kind(&products, ProductKind::Salt).is_empty());
    }

    #[test]
    fn test_on_day() {
        let pay = |h: u32, d: u32| Payment {
            id: format!("{d}-{h}"),
            owner_id: "c".into(),
            amount: Money::new(10),
            note: String::new(),
            settlement: Settlement::Partial,
            date: Utc.with_ymd_and_hms(2024, 6, d, h, 0, 0).unwrap(),
        };
        let payments = vec![pay(0, 1), pay(23, 1), pay(0, 2)];

        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let hits = on_day(&payments, day);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|p| p.date.date_naive() == day));
    }
}
