//! Types library for the trading platform
//!
//! This library provides all core type definitions shared by the exchange
//! and trading-client services: fixed-width identifiers, integer tick
//! prices and quantities, the order-entry and market-data wire records
//! with their packed binary codec, and per-ticker trading configuration.
//!
//! # Modules
//! - `ids`: Fixed-width identifiers (ClientId, TickerId, OrderId)
//! - `numeric`: Tick prices, quantities, priorities, nanosecond clocks
//! - `side`: Order side with its +1/-1 wire encoding
//! - `messages`: Order-entry and market-data records
//! - `wire`: Packed little-endian codec for the records
//! - `config`: Per-ticker strategy and risk configuration

pub mod config;
pub mod ids;
pub mod messages;
pub mod numeric;
pub mod side;
pub mod wire;

/// Maximum number of tradable instruments; one order book per id.
pub const MAX_TICKERS: usize = 8;

/// Maximum number of simultaneously connected trading clients.
pub const MAX_CLIENTS: usize = 256;

/// Maximum number of live exchange orders per book; sizes the order
/// arenas and the snapshot synthesizer's shadow tables.
pub const MAX_ORDER_IDS: usize = 64 * 1024;

/// Maximum number of distinct price levels per book side.
pub const MAX_PRICE_LEVELS: usize = 256;

/// Capacity of every inter-thread ring queue (requests, responses,
/// market updates). Rounded up to a power of two at construction.
pub const MAX_PENDING_MESSAGES: usize = 64 * 1024;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::ids::*;
    pub use crate::messages::*;
    pub use crate::numeric::*;
    pub use crate::side::*;
}
