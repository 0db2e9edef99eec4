//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Where Rounding Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ROUND ONCE, AT PERSISTENCE                                             │
//! │                                                                         │
//! │  UI hands us decimals:   unit price 9.99, payment 30.00                 │
//! │                                                                         │
//! │  Σ unit_price × qty is summed in Decimal (exact)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Money::round_half_up(sum)  → 2997 cents   (persisted total)            │
//! │  Money::round_half_up(pay)  → 3000 cents   (persisted payment)          │
//! │  payment - total            →    3 cents   (persisted change)           │
//! │                                                                         │
//! │  Rounding each line first and summing would compound the error          │
//! │  across line items; we never do that for the total.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockbook_core::money::Money;
//!
//! let price = Money::from_cents(999); // $9.99
//! let line = price.multiply_quantity(3);
//! assert_eq!(line.cents(), 2997);
//! assert_eq!(line.to_string(), "$29.97");
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in cents.
///
/// Signed so intermediate differences can be represented; every persisted
/// amount is checked to be non-negative before it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds a decimal amount half-up to two places and converts it to cents.
    ///
    /// Half-up means a trailing 5 rounds away from zero:
    /// `0.005 → 0.01`, `2.345 → 2.35`, `-0.005 → -0.01`.
    ///
    /// Returns `None` when the amount does not fit in `i64` cents.
    ///
    /// ## Example
    /// ```rust
    /// use std::str::FromStr;
    /// use rust_decimal::Decimal;
    /// use stockbook_core::money::Money;
    ///
    /// let amount = Decimal::from_str("2.345").unwrap();
    /// assert_eq!(Money::round_half_up(amount).unwrap().cents(), 235);
    /// ```
    pub fn round_half_up(amount: Decimal) -> Option<Self> {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        if rounded.scale() != 2 {
            return None;
        }
        i64::try_from(rounded.mantissa()).ok().map(Money)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-dollar portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns the value as an exact two-place decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// Returns `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and error messages. The UI layer formats for display.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_round_half_up_midpoints() {
        assert_eq!(Money::round_half_up(dec("0.005")).unwrap().cents(), 1);
        assert_eq!(Money::round_half_up(dec("0.004")).unwrap().cents(), 0);
        assert_eq!(Money::round_half_up(dec("2.345")).unwrap().cents(), 235);
        // Bankers rounding would give 2.34 here
        assert_eq!(Money::round_half_up(dec("2.3450")).unwrap().cents(), 235);
        assert_eq!(Money::round_half_up(dec("-0.005")).unwrap().cents(), -1);
    }

    #[test]
    fn test_round_half_up_pads_short_scales() {
        assert_eq!(Money::round_half_up(dec("30")).unwrap().cents(), 3000);
        assert_eq!(Money::round_half_up(dec("30.1")).unwrap().cents(), 3010);
    }

    #[test]
    fn test_round_half_up_overflow() {
        assert!(Money::round_half_up(Decimal::MAX).is_none());
    }

    #[test]
    fn test_decimal_round_trip() {
        assert_eq!(Money::from_cents(2997).to_decimal(), dec("29.97"));
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>().cents(), 2000);
    }

    #[test]
    fn test_multiply_quantity() {
        let unit_price = Money::from_cents(299);
        assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
        assert!(Money::from_cents(i64::MAX).checked_multiply_quantity(2).is_none());
    }
}
