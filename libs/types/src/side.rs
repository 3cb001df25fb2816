//! Order side (buyer or seller)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side with its signed wire encoding: BUY = +1, SELL = -1.
///
/// `Invalid` appears in records whose side field does not apply
/// (cancel rejects, trade prints keyed by the aggressor, snapshot
/// bracket records).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(i8)]
pub enum Side {
    Invalid = 0,
    Buy = 1,
    Sell = -1,
}

impl Side {
    /// Signed direction multiplier: +1 for buys, -1 for sells.
    pub fn to_value(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
            Side::Invalid => 0,
        }
    }

    /// Get the opposite side.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
            Side::Invalid => Side::Invalid,
        }
    }

    /// Index into two-slot per-side arrays. Indexing by an invalid
    /// side is a programming error.
    pub fn index(self) -> usize {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
            Side::Invalid => panic!("Side::Invalid has no array index"),
        }
    }

    pub fn is_valid(self) -> bool {
        self != Side::Invalid
    }

    /// Wire byte for the packed codec.
    pub fn to_wire(self) -> i8 {
        self as i8
    }

    /// Decode the wire byte; anything outside {-1, 0, 1} is rejected
    /// by the caller.
    pub fn from_wire(raw: i8) -> Option<Self> {
        match raw {
            1 => Some(Side::Buy),
            -1 => Some(Side::Sell),
            0 => Some(Side::Invalid),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
            Side::Invalid => "INVALID",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_value() {
        assert_eq!(Side::Buy.to_value(), 1);
        assert_eq!(Side::Sell.to_value(), -1);
        assert_eq!(Side::Invalid.to_value(), 0);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_side_wire_roundtrip() {
        for side in [Side::Buy, Side::Sell, Side::Invalid] {
            assert_eq!(Side::from_wire(side.to_wire()), Some(side));
        }
        assert_eq!(Side::from_wire(7), None);
    }

    #[test]
    #[should_panic(expected = "no array index")]
    fn test_invalid_side_index_panics() {
        Side::Invalid.index();
    }
}
