//! Client-side order book reconstruction
//!
//! Rebuilds one ticker's depth from the market-update stream. The
//! structure mirrors the matching book (circular best-first ladders
//! of price levels, circular FIFOs of orders within a level, arena
//! nodes linked by handles), but orders are keyed by market order id
//! only; the feed carries no client identity.
//!
//! ADD appends at the level's FIFO tail carrying the exchange-assigned
//! priority (the feed emits ADDs in ascending priority, which keeps
//! the FIFO ordered). MODIFY rewrites quantity in place. CANCEL
//! removes the order, dropping an emptied level. CLEAR frees the whole
//! book. TRADE never touches the book; it is surfaced to the owner
//! untouched.
//!
//! After every applied update the cached best bid and offer is
//! refreshed, but only when the touched side already had depth and
//! the touch landed at or inside its best. A side's first order (and
//! a CLEAR, whose record carries no side) leaves the cached top
//! unchanged until the side's next touch; the feed always follows a
//! CLEAR with the orders that repopulate it.

use std::collections::HashMap;

use perf::{Handle, Pool};
use types::ids::{OrderId, TickerId};
use types::messages::{MarketUpdate, UpdateKind};
use types::numeric::{Price, Priority, Qty};
use types::side::Side;
use types::{MAX_ORDER_IDS, MAX_PRICE_LEVELS};

/// Best bid and offer: best price and aggregate resting quantity on
/// each side. Invalid sentinels when a side is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bbo {
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_qty: Qty,
    pub ask_qty: Qty,
}

impl Default for Bbo {
    fn default() -> Self {
        Self {
            bid_price: Price::INVALID,
            ask_price: Price::INVALID,
            bid_qty: Qty::INVALID,
            ask_qty: Qty::INVALID,
        }
    }
}

impl Bbo {
    /// Both sides present?
    pub fn is_two_sided(&self) -> bool {
        self.bid_price.is_valid() && self.ask_price.is_valid()
    }
}

/// What the book tells its owner after applying one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookNotice {
    /// Book state (possibly) changed; the touched price and side.
    OrderBook { price: Price, side: Side },
    /// A trade print; the book itself did not change.
    Trade(MarketUpdate),
}

#[derive(Debug, Clone, Copy)]
struct MarketOrder {
    order_id: OrderId,
    side: Side,
    price: Price,
    qty: Qty,
    priority: Priority,
    prev: Handle,
    next: Handle,
}

#[derive(Debug, Clone, Copy)]
struct MarketLevel {
    side: Side,
    price: Price,
    first_order: Handle,
    prev: Handle,
    next: Handle,
}

/// Reconstructed depth for a single ticker.
pub struct MarketOrderBook {
    ticker_id: TickerId,
    orders: Pool<MarketOrder>,
    levels: Pool<MarketLevel>,
    bids_head: Handle,
    asks_head: Handle,
    level_at_price: HashMap<Price, Handle>,
    oid_to_order: HashMap<OrderId, Handle>,
    bbo: Bbo,
}

impl MarketOrderBook {
    pub fn new(ticker_id: TickerId) -> Self {
        Self {
            ticker_id,
            orders: Pool::with_capacity(MAX_ORDER_IDS),
            levels: Pool::with_capacity(2 * MAX_PRICE_LEVELS),
            bids_head: Handle::NIL,
            asks_head: Handle::NIL,
            level_at_price: HashMap::new(),
            oid_to_order: HashMap::new(),
            bbo: Bbo::default(),
        }
    }

    pub fn ticker_id(&self) -> TickerId {
        self.ticker_id
    }

    pub fn bbo(&self) -> &Bbo {
        &self.bbo
    }

    /// Apply one market update and report what happened.
    pub fn apply(&mut self, update: &MarketUpdate) -> BookNotice {
        if update.kind == UpdateKind::Trade {
            return BookNotice::Trade(*update);
        }

        // Decide up front whether the touched side's top can move:
        // the side must already exist and the touch must land at or
        // inside its current best.
        let refresh_bid = update.side == Side::Buy
            && !self.bids_head.is_nil()
            && update.price >= self.levels[self.bids_head].price;
        let refresh_ask = update.side == Side::Sell
            && !self.asks_head.is_nil()
            && update.price <= self.levels[self.asks_head].price;

        match update.kind {
            UpdateKind::Add => {
                let order_h = self.orders.alloc(MarketOrder {
                    order_id: update.order_id,
                    side: update.side,
                    price: update.price,
                    qty: update.qty,
                    priority: update.priority,
                    prev: Handle::NIL,
                    next: Handle::NIL,
                });
                self.insert_order(order_h);
                let previous = self.oid_to_order.insert(update.order_id, order_h);
                assert!(
                    previous.is_none(),
                    "ADD for already-present order {}",
                    update.order_id
                );
            }
            UpdateKind::Modify => {
                let order_h = *self
                    .oid_to_order
                    .get(&update.order_id)
                    .unwrap_or_else(|| panic!("MODIFY for unknown order {}", update.order_id));
                self.orders[order_h].qty = update.qty;
            }
            UpdateKind::Cancel => {
                let order_h = *self
                    .oid_to_order
                    .get(&update.order_id)
                    .unwrap_or_else(|| panic!("CANCEL for unknown order {}", update.order_id));
                self.remove_order(order_h);
            }
            UpdateKind::Clear => self.clear(),
            UpdateKind::Invalid | UpdateKind::SnapshotStart | UpdateKind::SnapshotEnd => {}
            UpdateKind::Trade => unreachable!(),
        }

        self.refresh_bbo(refresh_bid, refresh_ask);
        BookNotice::OrderBook {
            price: update.price,
            side: update.side,
        }
    }

    /// Free every order and level for this ticker.
    fn clear(&mut self) {
        let handles: Vec<Handle> = self.oid_to_order.drain().map(|(_, h)| h).collect();
        for order_h in handles {
            self.orders.free(order_h);
        }
        for head in [self.bids_head, self.asks_head] {
            if head.is_nil() {
                continue;
            }
            let mut cursor = head;
            loop {
                let next = self.levels[cursor].next;
                self.levels.free(cursor);
                if next == head {
                    break;
                }
                cursor = next;
            }
        }
        self.bids_head = Handle::NIL;
        self.asks_head = Handle::NIL;
        self.level_at_price.clear();
    }

    /// Recompute the cached BBO for the requested sides.
    fn refresh_bbo(&mut self, refresh_bid: bool, refresh_ask: bool) {
        if refresh_bid {
            if self.bids_head.is_nil() {
                self.bbo.bid_price = Price::INVALID;
                self.bbo.bid_qty = Qty::INVALID;
            } else {
                let (price, qty) = self.level_price_and_qty(self.bids_head);
                self.bbo.bid_price = price;
                self.bbo.bid_qty = qty;
            }
        }
        if refresh_ask {
            if self.asks_head.is_nil() {
                self.bbo.ask_price = Price::INVALID;
                self.bbo.ask_qty = Qty::INVALID;
            } else {
                let (price, qty) = self.level_price_and_qty(self.asks_head);
                self.bbo.ask_price = price;
                self.bbo.ask_qty = qty;
            }
        }
    }

    fn level_price_and_qty(&self, level_h: Handle) -> (Price, Qty) {
        let level = &self.levels[level_h];
        let mut qty = Qty::ZERO;
        let first = level.first_order;
        let mut cursor = first;
        loop {
            qty += self.orders[cursor].qty;
            cursor = self.orders[cursor].next;
            if cursor == first {
                break;
            }
        }
        (level.price, qty)
    }

    fn head(&self, side: Side) -> Handle {
        match side {
            Side::Buy => self.bids_head,
            Side::Sell => self.asks_head,
            Side::Invalid => panic!("head of invalid side"),
        }
    }

    fn set_head(&mut self, side: Side, handle: Handle) {
        match side {
            Side::Buy => self.bids_head = handle,
            Side::Sell => self.asks_head = handle,
            Side::Invalid => panic!("head of invalid side"),
        }
    }

    fn ranks_before(side: Side, a: Price, b: Price) -> bool {
        match side {
            Side::Buy => a > b,
            Side::Sell => a < b,
            Side::Invalid => panic!("rank on invalid side"),
        }
    }

    fn insert_order(&mut self, order_h: Handle) {
        let (side, price) = {
            let o = &self.orders[order_h];
            (o.side, o.price)
        };

        match self.level_at_price.get(&price).copied() {
            None => {
                let o = &mut self.orders[order_h];
                o.prev = order_h;
                o.next = order_h;
                let level_h = self.levels.alloc(MarketLevel {
                    side,
                    price,
                    first_order: order_h,
                    prev: Handle::NIL,
                    next: Handle::NIL,
                });
                self.level_at_price.insert(price, level_h);
                self.insert_level(level_h);
            }
            Some(level_h) => {
                let first = self.levels[level_h].first_order;
                let tail = self.orders[first].prev;
                self.orders[order_h].prev = tail;
                self.orders[order_h].next = first;
                self.orders[tail].next = order_h;
                self.orders[first].prev = order_h;
            }
        }
    }

    fn insert_level(&mut self, level_h: Handle) {
        let (side, price) = {
            let l = &self.levels[level_h];
            (l.side, l.price)
        };
        let head = self.head(side);

        if head.is_nil() {
            let l = &mut self.levels[level_h];
            l.prev = level_h;
            l.next = level_h;
            self.set_head(side, level_h);
            return;
        }

        let mut cursor = head;
        loop {
            if Self::ranks_before(side, price, self.levels[cursor].price) {
                self.link_level_before(level_h, cursor);
                if cursor == head {
                    self.set_head(side, level_h);
                }
                return;
            }
            cursor = self.levels[cursor].next;
            if cursor == head {
                self.link_level_before(level_h, head);
                return;
            }
        }
    }

    fn link_level_before(&mut self, new_h: Handle, at_h: Handle) {
        let prev = self.levels[at_h].prev;
        self.levels[new_h].prev = prev;
        self.levels[new_h].next = at_h;
        self.levels[prev].next = new_h;
        self.levels[at_h].prev = new_h;
    }

    fn remove_order(&mut self, order_h: Handle) {
        let order = self.orders[order_h];
        let level_h = *self
            .level_at_price
            .get(&order.price)
            .expect("live order without a price level");

        if order.next == order_h {
            self.remove_level(level_h);
        } else {
            self.orders[order.prev].next = order.next;
            self.orders[order.next].prev = order.prev;
            if self.levels[level_h].first_order == order_h {
                self.levels[level_h].first_order = order.next;
            }
        }

        self.oid_to_order.remove(&order.order_id);
        self.orders.free(order_h);
    }

    fn remove_level(&mut self, level_h: Handle) {
        let level = self.levels[level_h];
        if level.next == level_h {
            self.set_head(level.side, Handle::NIL);
        } else {
            self.levels[level.prev].next = level.next;
            self.levels[level.next].prev = level.prev;
            if self.head(level.side) == level_h {
                self.set_head(level.side, level.next);
            }
        }
        self.level_at_price.remove(&level.price);
        self.levels.free(level_h);
    }

    // ---- introspection ----

    /// Ladder prices best-first for one side.
    pub fn side_prices(&self, side: Side) -> Vec<Price> {
        let head = self.head(side);
        let mut prices = Vec::new();
        if head.is_nil() {
            return prices;
        }
        let mut cursor = head;
        loop {
            prices.push(self.levels[cursor].price);
            cursor = self.levels[cursor].next;
            if cursor == head {
                break;
            }
        }
        prices
    }

    /// Orders at one price in FIFO order.
    pub fn orders_at(&self, price: Price) -> Vec<(OrderId, Qty, Priority)> {
        let mut out = Vec::new();
        let Some(&level_h) = self.level_at_price.get(&price) else {
            return out;
        };
        let first = self.levels[level_h].first_order;
        let mut cursor = first;
        loop {
            let o = &self.orders[cursor];
            out.push((o.order_id, o.qty, o.priority));
            cursor = o.next;
            if cursor == first {
                break;
            }
        }
        out
    }

    /// Every live order as an (order_id, side, price, qty, priority)
    /// tuple; used for book-equivalence comparisons.
    pub fn live_orders(&self) -> Vec<(OrderId, Side, Price, Qty, Priority)> {
        let mut out = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            for price in self.side_prices(side) {
                for (order_id, qty, priority) in self.orders_at(price) {
                    out.push((order_id, side, price, qty, priority));
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.bids_head.is_nil() && self.asks_head.is_nil()
    }

    /// Structural validity: sorted ladders, increasing priorities
    /// within each level, no crossed top.
    pub fn check_invariants(&self) {
        for side in [Side::Buy, Side::Sell] {
            let prices = self.side_prices(side);
            for pair in prices.windows(2) {
                assert!(
                    Self::ranks_before(side, pair[0], pair[1]),
                    "{side} ladder out of order: {} then {}",
                    pair[0],
                    pair[1]
                );
            }
            for price in prices {
                let orders = self.orders_at(price);
                for pair in orders.windows(2) {
                    assert!(
                        pair[0].2 < pair[1].2,
                        "priorities not increasing at {price}: {:?}",
                        orders
                    );
                }
            }
        }
        if self.bbo.is_two_sided() {
            assert!(
                self.bbo.bid_price < self.bbo.ask_price,
                "crossed BBO: {:?}",
                self.bbo
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(oid: u64, side: Side, price: i64, qty: u64, priority: u64) -> MarketUpdate {
        MarketUpdate {
            kind: UpdateKind::Add,
            order_id: OrderId::new(oid),
            ticker_id: TickerId::new(0),
            side,
            price: Price::new(price),
            qty: Qty::new(qty),
            priority: Priority::new(priority),
        }
    }

    fn modify(oid: u64, side: Side, price: i64, qty: u64) -> MarketUpdate {
        MarketUpdate {
            kind: UpdateKind::Modify,
            order_id: OrderId::new(oid),
            ticker_id: TickerId::new(0),
            side,
            price: Price::new(price),
            qty: Qty::new(qty),
            priority: Priority::INVALID,
        }
    }

    fn cancel(oid: u64, side: Side, price: i64) -> MarketUpdate {
        MarketUpdate {
            kind: UpdateKind::Cancel,
            order_id: OrderId::new(oid),
            ticker_id: TickerId::new(0),
            side,
            price: Price::new(price),
            qty: Qty::ZERO,
            priority: Priority::INVALID,
        }
    }

    fn book() -> MarketOrderBook {
        MarketOrderBook::new(TickerId::new(0))
    }

    #[test]
    fn test_first_add_leaves_bbo_stale_until_second_touch() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        book.check_invariants();

        // The side was empty when the touch was evaluated, so the
        // cached top is not recomputed yet.
        assert_eq!(book.bbo().bid_price, Price::INVALID);
        assert_eq!(book.bbo().bid_qty, Qty::INVALID);

        // The next touch at (or inside) the best refreshes it.
        book.apply(&add(2, Side::Buy, 99, 5, 2));
        assert_eq!(book.bbo().bid_price, Price::new(99));
        assert_eq!(book.bbo().bid_qty, Qty::new(15));
        assert_eq!(book.bbo().ask_price, Price::INVALID);
    }

    #[test]
    fn test_bbo_aggregates_best_level_qty() {
        let mut book = book();
        book.apply(&add(1, Side::Sell, 101, 10, 1));
        book.apply(&add(2, Side::Sell, 101, 7, 2));
        book.apply(&add(3, Side::Sell, 102, 50, 1));
        book.check_invariants();

        assert_eq!(book.bbo().ask_price, Price::new(101));
        assert_eq!(book.bbo().ask_qty, Qty::new(17));
    }

    #[test]
    fn test_worse_add_does_not_recompute_top() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        // Worse than the best: the stale top stays stale.
        book.apply(&add(2, Side::Buy, 95, 5, 1));
        assert_eq!(book.bbo().bid_price, Price::INVALID);

        // Better add moves the top.
        book.apply(&add(3, Side::Buy, 100, 3, 1));
        assert_eq!(book.bbo().bid_price, Price::new(100));
        assert_eq!(book.bbo().bid_qty, Qty::new(3));
    }

    #[test]
    fn test_modify_rewrites_qty_in_place() {
        let mut book = book();
        book.apply(&add(1, Side::Sell, 101, 10, 1));
        book.apply(&modify(1, Side::Sell, 101, 4));
        book.check_invariants();

        assert_eq!(book.bbo().ask_qty, Qty::new(4));
        assert_eq!(
            book.orders_at(Price::new(101)),
            vec![(OrderId::new(1), Qty::new(4), Priority::new(1))]
        );
    }

    #[test]
    fn test_cancel_removes_order_and_empty_level() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        book.apply(&add(2, Side::Buy, 98, 5, 1));
        book.apply(&cancel(1, Side::Buy, 99));
        book.check_invariants();

        assert_eq!(book.side_prices(Side::Buy), vec![Price::new(98)]);
        assert_eq!(book.bbo().bid_price, Price::new(98));

        book.apply(&cancel(2, Side::Buy, 98));
        assert!(book.is_empty());
        assert_eq!(book.bbo().bid_price, Price::INVALID);
        assert_eq!(book.bbo().bid_qty, Qty::INVALID);
    }

    #[test]
    fn test_fifo_respects_carried_priority() {
        let mut book = book();
        book.apply(&add(5, Side::Sell, 101, 1, 3));
        book.apply(&add(9, Side::Sell, 101, 2, 7));
        book.check_invariants();

        assert_eq!(
            book.orders_at(Price::new(101)),
            vec![
                (OrderId::new(5), Qty::new(1), Priority::new(3)),
                (OrderId::new(9), Qty::new(2), Priority::new(7)),
            ]
        );
    }

    #[test]
    fn test_trade_is_forwarded_not_applied() {
        let mut book = book();
        book.apply(&add(1, Side::Sell, 101, 10, 1));
        book.apply(&add(2, Side::Sell, 101, 5, 2));
        assert_eq!(book.bbo().ask_qty, Qty::new(15));

        let trade = MarketUpdate {
            kind: UpdateKind::Trade,
            side: Side::Buy,
            price: Price::new(101),
            qty: Qty::new(4),
            ticker_id: TickerId::new(0),
            ..MarketUpdate::default()
        };

        let notice = book.apply(&trade);
        assert_eq!(notice, BookNotice::Trade(trade));
        // Book untouched until the MODIFY/CANCEL arrives.
        assert_eq!(book.bbo().ask_qty, Qty::new(15));
        assert_eq!(
            book.orders_at(Price::new(101)),
            vec![
                (OrderId::new(1), Qty::new(10), Priority::new(1)),
                (OrderId::new(2), Qty::new(5), Priority::new(2)),
            ]
        );
    }

    #[test]
    fn test_clear_frees_everything() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        book.apply(&add(2, Side::Buy, 99, 5, 2));
        book.apply(&add(3, Side::Sell, 101, 5, 1));
        assert_eq!(book.bbo().bid_price, Price::new(99));

        book.apply(&MarketUpdate::clear(TickerId::new(0)));
        assert!(book.is_empty());
        // CLEAR carries no side: the cached top goes stale, not
        // invalid; the feed repopulates the book right behind it.
        assert_eq!(book.bbo().bid_price, Price::new(99));

        // The book is fully reusable after a clear.
        book.apply(&add(4, Side::Buy, 90, 1, 1));
        book.apply(&add(5, Side::Buy, 90, 2, 2));
        assert_eq!(book.side_prices(Side::Buy), vec![Price::new(90)]);
        assert_eq!(book.bbo().bid_price, Price::new(90));
        assert_eq!(book.bbo().bid_qty, Qty::new(3));
    }

    #[test]
    #[should_panic(expected = "ADD for already-present order")]
    fn test_duplicate_add_is_fatal() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        book.apply(&add(1, Side::Buy, 99, 10, 2));
    }

    #[test]
    #[should_panic(expected = "CANCEL for unknown order")]
    fn test_unknown_cancel_is_fatal() {
        let mut book = book();
        book.apply(&cancel(42, Side::Buy, 99));
    }

    #[test]
    fn test_snapshot_brackets_leave_book_alone() {
        let mut book = book();
        book.apply(&add(1, Side::Buy, 99, 10, 1));
        let notice = book.apply(&MarketUpdate::snapshot_bracket(UpdateKind::SnapshotStart, 7));
        assert!(matches!(notice, BookNotice::OrderBook { .. }));
        assert_eq!(book.side_prices(Side::Buy), vec![Price::new(99)]);
        assert_eq!(book.bbo().bid_price, Price::INVALID);
    }
}
