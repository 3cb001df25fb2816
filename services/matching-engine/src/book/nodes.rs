//! Arena node types for the matching book
//!
//! Orders and price levels live in fixed-capacity pools and link to
//! each other through stable handles, never pointers. Both lists are
//! circular: a level's FIFO wraps from its last order back to
//! `first_order`, and the price ladder wraps from the worst level back
//! to the best. A single-element list links to itself.

use perf::Handle;
use types::ids::{ClientId, OrderId};
use types::numeric::{Price, Priority, Qty};
use types::side::Side;

/// A resting order inside the matching book.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeOrder {
    pub client_id: ClientId,
    pub client_order_id: OrderId,
    pub market_order_id: OrderId,
    pub side: Side,
    pub price: Price,
    /// Remaining (unfilled) quantity.
    pub qty: Qty,
    pub priority: Priority,
    /// Neighbours in the level's circular FIFO.
    pub prev: Handle,
    pub next: Handle,
}

/// One price level: the FIFO of orders resting at a single price.
#[derive(Debug, Clone, Copy)]
pub struct PriceLevel {
    pub side: Side,
    pub price: Price,
    /// Head of the FIFO; matching always consumes this order first.
    pub first_order: Handle,
    /// Neighbours in the side's circular ladder, ordered best first.
    pub prev: Handle,
    pub next: Handle,
}
