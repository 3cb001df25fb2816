//! Fixed-width identifier types for platform entities
//!
//! All identifiers are small dense integers so that hot-path containers
//! can be plain arrays indexed by id. Every type carries an `INVALID`
//! sentinel (the all-ones bit pattern) used in wire records whose field
//! does not apply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a trading client connection.
///
/// Bounded by `MAX_CLIENTS`; doubles as an index into per-client tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    pub const INVALID: ClientId = ClientId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Index into per-client arrays.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Identifier of a tradable instrument.
///
/// Bounded by `MAX_TICKERS`; there is exactly one order book per id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TickerId(u32);

impl TickerId {
    pub const INVALID: TickerId = TickerId(u32::MAX);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    /// Index into per-ticker arrays.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for TickerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// Identifier of an order.
///
/// Client-scoped when chosen by a trading client on a request,
/// exchange-scoped when minted by a matching book as a market order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    pub const INVALID: OrderId = OrderId(u64::MAX);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Index into dense per-order tables (snapshot shadow books).
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "INVALID")
        }
    }
}
