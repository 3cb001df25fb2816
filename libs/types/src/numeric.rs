//! Integer tick prices, quantities, and priorities
//!
//! Books and wire records use fixed-width integers end to end: prices
//! are signed tick counts, quantities unsigned lots. Derived monetary
//! values (VWAPs, PnL, fair prices) are computed in `Decimal` so the
//! same inputs always produce the same output on every host.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wall-clock timestamp in nanoseconds since the Unix epoch.
pub type Nanos = i64;

pub const NANOS_PER_SEC: Nanos = 1_000_000_000;

/// Price in signed integer ticks.
///
/// `INVALID` is the minimum value so that a valid price never collides
/// with the sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    pub const INVALID: Price = Price(i64::MIN);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    /// Shift the price by a signed number of ticks.
    pub fn offset(self, ticks: i64) -> Self {
        Self(self.0 + ticks)
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Quantity in unsigned lots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qty(u64);

impl Qty {
    pub const INVALID: Qty = Qty(u64::MAX);
    pub const ZERO: Qty = Qty(0);

    pub const fn new(lots: u64) -> Self {
        Self(lots)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn min(self, other: Qty) -> Qty {
        Qty(self.0.min(other.0))
    }

    pub fn as_decimal(self) -> Decimal {
        Decimal::from(self.0)
    }
}

impl std::ops::Add for Qty {
    type Output = Qty;

    fn add(self, rhs: Qty) -> Qty {
        Qty(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Qty {
    type Output = Qty;

    fn sub(self, rhs: Qty) -> Qty {
        assert!(self.0 >= rhs.0, "quantity underflow: {} - {}", self.0, rhs.0);
        Qty(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Qty {
    fn add_assign(&mut self, rhs: Qty) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Qty {
    fn sub_assign(&mut self, rhs: Qty) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Intra-price-level FIFO rank.
///
/// Minted by the matching book per (ticker, price), strictly increasing
/// in processing order; carried on ADD market updates so the client
/// book can reproduce queue positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(u64);

impl Priority {
    pub const INVALID: Priority = Priority(u64::MAX);

    pub const fn new(rank: u64) -> Self {
        Self(rank)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_sentinel() {
        assert!(!Price::INVALID.is_valid());
        assert!(Price::new(0).is_valid());
        assert!(Price::new(-5).is_valid());
    }

    #[test]
    fn test_price_offset() {
        let p = Price::new(100);
        assert_eq!(p.offset(-1), Price::new(99));
        assert_eq!(p.offset(2), Price::new(102));
    }

    #[test]
    fn test_qty_arithmetic() {
        let a = Qty::new(10);
        let b = Qty::new(4);
        assert_eq!(a + b, Qty::new(14));
        assert_eq!(a - b, Qty::new(6));
        assert_eq!(a.min(b), b);
    }

    #[test]
    #[should_panic(expected = "quantity underflow")]
    fn test_qty_underflow_panics() {
        let _ = Qty::new(1) - Qty::new(2);
    }

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(Price::new(101).as_decimal(), Decimal::from(101));
        assert_eq!(Qty::new(7).as_decimal(), Decimal::from(7));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::new(1) < Priority::new(2));
        assert!(!Priority::INVALID.is_valid());
    }
}
