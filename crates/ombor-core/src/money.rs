//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Debts are running totals: thousands of purchases, sales and partial   │
//! │  payments are added and subtracted over the life of a factory.         │
//! │                                                                         │
//! │  With floats, 0.1 + 0.2 = 0.30000000000000004 and the error compounds. │
//! │  A reconciliation pass would then report drift that is only rounding.  │
//! │                                                                         │
//! │  OUR SOLUTION: integers in the smallest currency unit                  │
//! │    Every amount is exact, replaying history reproduces the stored      │
//! │    debt bit for bit                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ombor_core::money::Money;
//!
//! let price = Money::new(12_500);
//! let total = price.checked_mul_quantity(40).unwrap();
//! assert_eq!(total, Money::new(500_000));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Serialized as a bare JSON integer so documents stay readable by the
/// dashboard frontend.
///
/// ## Where Money is Used
/// ```text
/// Product.buy_price × amount ──► Purchase obligation ──► Factory.debt
///
/// SaleItem.price × amount ──► SaleItem.line_total ──► Sale.total_price
///                                                          │
///                                                          ▼
///                                                     Customer.debt
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from smallest currency units.
    #[inline]
    pub const fn new(amount: i64) -> Self {
        Money(amount)
    }

    /// Returns the raw amount in smallest currency units.
    #[inline]
    pub const fn amount(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies a unit price by a quantity, returning `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use ombor_core::money::Money;
    ///
    /// let unit_price = Money::new(299);
    /// assert_eq!(unit_price.checked_mul_quantity(3), Some(Money::new(897)));
    /// assert_eq!(Money::new(i64::MAX).checked_mul_quantity(2), None);
    /// ```
    #[inline]
    pub fn checked_mul_quantity(&self, qty: i64) -> Option<Self> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub fn checked_add(&self, other: Money) -> Option<Self> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Adds two amounts, clamping at the `i64` bounds.
    #[inline]
    pub fn saturating_add(&self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }

    /// Subtracts two amounts, clamping at the `i64` bounds.
    #[inline]
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Subtracts `other`, flooring the result at zero.
    ///
    /// This is the debt-reduction rule: a debt never goes negative, any
    /// excess is simply absorbed.
    ///
    /// ## Example
    /// ```rust
    /// use ombor_core::money::Money;
    ///
    /// assert_eq!(Money::new(400).saturating_sub_floor(Money::new(150)), Money::new(250));
    /// assert_eq!(Money::new(400).saturating_sub_floor(Money::new(900)), Money::zero());
    /// ```
    #[inline]
    pub fn saturating_sub_floor(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the plain amount. Currency formatting is the frontend's job.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Totals saturate: aggregates over stored documents must not panic.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc.saturating_add(m))
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
