//! The matching engine's limit order book
//!
//! One `OrderBook` per ticker. Bids and asks are circular ladders of
//! price levels ordered best-first (bids strictly descending, asks
//! strictly ascending); each level is a circular FIFO of orders in
//! priority order. All nodes are arena-allocated and index-linked.
//!
//! `add` and `cancel` emit every resulting client response and market
//! update through the sink they are given, in the exact order the
//! events take effect: an ACCEPTED always precedes fills; within one
//! passive fill the aggressor FILLED precedes the passive FILLED
//! precedes the TRADE print; an exhausted passive order's CANCEL
//! update immediately follows its TRADE.

pub mod nodes;

use std::collections::HashMap;

use perf::{Handle, Pool};
use types::ids::{ClientId, OrderId, TickerId};
use types::messages::{ClientResponse, MarketUpdate, ResponseKind, UpdateKind};
use types::numeric::{Price, Priority, Qty};
use types::side::Side;
use types::{MAX_CLIENTS, MAX_ORDER_IDS, MAX_PRICE_LEVELS};

use crate::events::OutboundSink;
pub use nodes::{ExchangeOrder, PriceLevel};

/// Price-time-priority limit order book for a single ticker.
pub struct OrderBook {
    ticker_id: TickerId,
    orders: Pool<ExchangeOrder>,
    levels: Pool<PriceLevel>,
    /// Best bid level, or NIL when the side is empty.
    bids_head: Handle,
    /// Best ask level, or NIL when the side is empty.
    asks_head: Handle,
    level_at_price: HashMap<Price, Handle>,
    /// Per-price priority mint; never reset, so priorities stay unique
    /// per (ticker, price) across level rebuilds.
    next_priority: HashMap<Price, u64>,
    /// Per-client map from client order id to the live order's handle.
    client_orders: Vec<HashMap<OrderId, Handle>>,
    next_market_order_id: u64,
}

impl OrderBook {
    pub fn new(ticker_id: TickerId) -> Self {
        Self {
            ticker_id,
            orders: Pool::with_capacity(MAX_ORDER_IDS),
            levels: Pool::with_capacity(2 * MAX_PRICE_LEVELS),
            bids_head: Handle::NIL,
            asks_head: Handle::NIL,
            level_at_price: HashMap::new(),
            next_priority: HashMap::new(),
            client_orders: vec![HashMap::new(); MAX_CLIENTS],
            next_market_order_id: 1,
        }
    }

    pub fn ticker_id(&self) -> TickerId {
        self.ticker_id
    }

    /// Process a new limit order: accept, match against the opposite
    /// side, and rest any remainder.
    pub fn add(
        &mut self,
        client_id: ClientId,
        client_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
        sink: &mut impl OutboundSink,
    ) {
        let market_order_id = OrderId::new(self.next_market_order_id);
        self.next_market_order_id += 1;

        sink.on_response(ClientResponse {
            kind: ResponseKind::Accepted,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            market_order_id,
            side,
            price,
            exec_qty: Qty::ZERO,
            leaves_qty: qty,
        });

        let leaves_qty =
            self.match_against_book(client_id, client_order_id, market_order_id, side, price, qty, sink);

        if !leaves_qty.is_zero() {
            let priority = self.mint_priority(price);
            let order_h = self.orders.alloc(ExchangeOrder {
                client_id,
                client_order_id,
                market_order_id,
                side,
                price,
                qty: leaves_qty,
                priority,
                prev: Handle::NIL,
                next: Handle::NIL,
            });
            self.insert_order(order_h);
            self.client_orders[client_id.index()].insert(client_order_id, order_h);

            sink.on_update(MarketUpdate {
                kind: UpdateKind::Add,
                order_id: market_order_id,
                ticker_id: self.ticker_id,
                side,
                price,
                qty: leaves_qty,
                priority,
            });
        }
    }

    /// Cancel a live order. Unknown orders (or out-of-range client
    /// ids) soft-fail with a CANCEL_REJECTED response and no market
    /// update.
    pub fn cancel(&mut self, client_id: ClientId, order_id: OrderId, sink: &mut impl OutboundSink) {
        let order_h = if client_id.index() < self.client_orders.len() {
            self.client_orders[client_id.index()].get(&order_id).copied()
        } else {
            None
        };

        let Some(order_h) = order_h else {
            sink.on_response(ClientResponse {
                kind: ResponseKind::CancelRejected,
                client_id,
                ticker_id: self.ticker_id,
                client_order_id: order_id,
                ..ClientResponse::default()
            });
            return;
        };

        let order = self.orders[order_h];
        sink.on_update(MarketUpdate {
            kind: UpdateKind::Cancel,
            order_id: order.market_order_id,
            ticker_id: self.ticker_id,
            side: order.side,
            price: order.price,
            qty: Qty::ZERO,
            priority: order.priority,
        });
        self.remove_order(order_h);

        sink.on_response(ClientResponse {
            kind: ResponseKind::Canceled,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id: order_id,
            market_order_id: order.market_order_id,
            side: order.side,
            price: order.price,
            exec_qty: Qty::INVALID,
            leaves_qty: order.qty,
        });
    }

    /// Sweep the opposite side while the aggressor still has quantity
    /// and the best passive price crosses. Returns the unmatched
    /// remainder.
    fn match_against_book(
        &mut self,
        client_id: ClientId,
        client_order_id: OrderId,
        market_order_id: OrderId,
        side: Side,
        price: Price,
        qty: Qty,
        sink: &mut impl OutboundSink,
    ) -> Qty {
        let mut leaves_qty = qty;
        loop {
            if leaves_qty.is_zero() {
                break;
            }
            let level_h = match side {
                Side::Buy => self.asks_head,
                Side::Sell => self.bids_head,
                Side::Invalid => panic!("match on invalid side"),
            };
            if level_h.is_nil() {
                break;
            }
            let passive_h = self.levels[level_h].first_order;
            let passive_price = self.orders[passive_h].price;
            let crosses = match side {
                Side::Buy => price >= passive_price,
                Side::Sell => price <= passive_price,
                Side::Invalid => unreachable!(),
            };
            if !crosses {
                break;
            }

            leaves_qty = self.fill(
                client_id,
                client_order_id,
                market_order_id,
                side,
                passive_h,
                leaves_qty,
                sink,
            );
        }
        leaves_qty
    }

    /// Execute one fill against the passive order at the head of the
    /// best opposing level.
    #[allow(clippy::too_many_arguments)]
    fn fill(
        &mut self,
        client_id: ClientId,
        client_order_id: OrderId,
        market_order_id: OrderId,
        side: Side,
        passive_h: Handle,
        leaves_qty: Qty,
        sink: &mut impl OutboundSink,
    ) -> Qty {
        let passive = self.orders[passive_h];
        let fill_qty = leaves_qty.min(passive.qty);
        let leaves_qty = leaves_qty - fill_qty;
        let passive_leaves = passive.qty - fill_qty;
        self.orders[passive_h].qty = passive_leaves;

        sink.on_response(ClientResponse {
            kind: ResponseKind::Filled,
            client_id,
            ticker_id: self.ticker_id,
            client_order_id,
            market_order_id,
            side,
            price: passive.price,
            exec_qty: fill_qty,
            leaves_qty,
        });
        sink.on_response(ClientResponse {
            kind: ResponseKind::Filled,
            client_id: passive.client_id,
            ticker_id: self.ticker_id,
            client_order_id: passive.client_order_id,
            market_order_id: passive.market_order_id,
            side: passive.side,
            price: passive.price,
            exec_qty: fill_qty,
            leaves_qty: passive_leaves,
        });
        sink.on_update(MarketUpdate {
            kind: UpdateKind::Trade,
            order_id: OrderId::INVALID,
            ticker_id: self.ticker_id,
            side,
            price: passive.price,
            qty: fill_qty,
            priority: Priority::INVALID,
        });

        if passive_leaves.is_zero() {
            sink.on_update(MarketUpdate {
                kind: UpdateKind::Cancel,
                order_id: passive.market_order_id,
                ticker_id: self.ticker_id,
                side: passive.side,
                price: passive.price,
                qty: passive.qty,
                priority: Priority::INVALID,
            });
            self.remove_order(passive_h);
        } else {
            sink.on_update(MarketUpdate {
                kind: UpdateKind::Modify,
                order_id: passive.market_order_id,
                ticker_id: self.ticker_id,
                side: passive.side,
                price: passive.price,
                qty: passive_leaves,
                priority: passive.priority,
            });
        }

        leaves_qty
    }

    fn mint_priority(&mut self, price: Price) -> Priority {
        let counter = self.next_priority.entry(price).or_insert(0);
        *counter += 1;
        Priority::new(*counter)
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

    /// Does `a` rank ahead of `b` in the ladder of `side`?
    fn ranks_before(side: Side, a: Price, b: Price) -> bool {
        match side {
            Side::Buy => a > b,
            Side::Sell => a < b,
            Side::Invalid => panic!("rank on invalid side"),
        }
    }

    /// Append the order to its price level's FIFO tail, creating and
    /// splicing in the level if this is the first order at the price.
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
                let level_h = self.levels.alloc(PriceLevel {
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

    /// Splice a fresh level into its side's circular ladder at the
    /// correct rank.
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
                // Worse than every existing level: tail position,
                // which in a circular ladder sits just before head.
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

    /// Unlink and free one order; drops its level when the FIFO
    /// empties.
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

        self.client_orders[order.client_id.index()].remove(&order.client_order_id);
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

    // ---- introspection (tests, logging, validity checks) ----

    /// Best price and aggregate quantity on the bid side.
    pub fn best_bid(&self) -> Option<(Price, Qty)> {
        self.best_of(self.bids_head)
    }

    /// Best price and aggregate quantity on the ask side.
    pub fn best_ask(&self) -> Option<(Price, Qty)> {
        self.best_of(self.asks_head)
    }

    fn best_of(&self, head: Handle) -> Option<(Price, Qty)> {
        if head.is_nil() {
            return None;
        }
        let level = &self.levels[head];
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
        Some((level.price, qty))
    }

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
            out.push((o.market_order_id, o.qty, o.priority));
            cursor = o.next;
            if cursor == first {
                break;
            }
        }
        out
    }

    /// Every live order as a (market_order_id, side, price, qty,
    /// priority) tuple; order unspecified. Used for book-equivalence
    /// comparisons.
    pub fn live_orders(&self) -> Vec<(OrderId, Side, Price, Qty, Priority)> {
        let mut out = Vec::new();
        for side in [Side::Buy, Side::Sell] {
            for price in self.side_prices(side) {
                let level_h = self.level_at_price[&price];
                let first = self.levels[level_h].first_order;
                let mut cursor = first;
                loop {
                    let o = &self.orders[cursor];
                    out.push((o.market_order_id, o.side, o.price, o.qty, o.priority));
                    cursor = o.next;
                    if cursor == first {
                        break;
                    }
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.bids_head.is_nil() && self.asks_head.is_nil()
    }

    /// Walk the whole book and panic on any structural violation:
    /// unsorted ladders, non-increasing priorities within a level, or
    /// a crossed book.
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
        if let (Some((bid, _)), Some((ask, _))) = (self.best_bid(), self.best_ask()) {
            assert!(bid < ask, "crossed book: bid {bid} >= ask {ask}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Outbound, RecordingSink};

    fn book() -> OrderBook {
        OrderBook::new(TickerId::new(0))
    }

    fn add(
        book: &mut OrderBook,
        sink: &mut RecordingSink,
        client: u32,
        coid: u64,
        side: Side,
        price: i64,
        qty: u64,
    ) {
        book.add(
            ClientId::new(client),
            OrderId::new(coid),
            side,
            Price::new(price),
            Qty::new(qty),
            sink,
        );
        book.check_invariants();
    }

    #[test]
    fn test_resting_order_emits_accept_then_add() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 10);

        assert_eq!(sink.events.len(), 2);
        match sink.events[0] {
            Outbound::Response(r) => {
                assert_eq!(r.kind, ResponseKind::Accepted);
                assert_eq!(r.market_order_id, OrderId::new(1));
                assert_eq!(r.leaves_qty, Qty::new(10));
            }
            _ => panic!("expected ACCEPTED first"),
        }
        match sink.events[1] {
            Outbound::Update(u) => {
                assert_eq!(u.kind, UpdateKind::Add);
                assert_eq!(u.order_id, OrderId::new(1));
                assert_eq!(u.qty, Qty::new(10));
                assert_eq!(u.priority, Priority::new(1));
            }
            _ => panic!("expected ADD second"),
        }

        assert_eq!(book.best_ask(), Some((Price::new(100), Qty::new(10))));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_partial_fill_against_resting_order() {
        // Resting SELL 10 @ 100, aggressor BUY 4 @ 100.
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 10);
        sink.clear();
        add(&mut book, &mut sink, 2, 2, Side::Buy, 100, 4);

        let responses = sink.responses();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0].kind, ResponseKind::Accepted);
        assert_eq!(responses[0].client_id, ClientId::new(2));

        // Aggressor fill precedes passive fill.
        assert_eq!(responses[1].kind, ResponseKind::Filled);
        assert_eq!(responses[1].client_id, ClientId::new(2));
        assert_eq!(responses[1].exec_qty, Qty::new(4));
        assert_eq!(responses[1].leaves_qty, Qty::new(0));

        assert_eq!(responses[2].kind, ResponseKind::Filled);
        assert_eq!(responses[2].client_id, ClientId::new(1));
        assert_eq!(responses[2].exec_qty, Qty::new(4));
        assert_eq!(responses[2].leaves_qty, Qty::new(6));

        let updates = sink.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].kind, UpdateKind::Trade);
        assert_eq!(updates[0].order_id, OrderId::INVALID);
        assert_eq!(updates[0].price, Price::new(100));
        assert_eq!(updates[0].qty, Qty::new(4));
        assert_eq!(updates[0].priority, Priority::INVALID);

        assert_eq!(updates[1].kind, UpdateKind::Modify);
        assert_eq!(updates[1].order_id, OrderId::new(1));
        assert_eq!(updates[1].qty, Qty::new(6));
        assert_eq!(updates[1].priority, Priority::new(1));

        // Book: asks = [100: qty 6], bids empty.
        assert_eq!(book.best_ask(), Some((Price::new(100), Qty::new(6))));
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_responses_precede_updates_within_a_fill() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 5);
        sink.clear();
        add(&mut book, &mut sink, 2, 2, Side::Buy, 100, 5);

        // ACCEPTED, aggressor FILLED, passive FILLED, TRADE, CANCEL.
        let kinds: Vec<&str> = sink
            .events
            .iter()
            .map(|e| match e {
                Outbound::Response(r) => match r.kind {
                    ResponseKind::Accepted => "accepted",
                    ResponseKind::Filled => "filled",
                    _ => "other",
                },
                Outbound::Update(u) => u.kind.label(),
            })
            .collect();
        assert_eq!(kinds, ["accepted", "filled", "filled", "TRADE", "CANCEL"]);
        assert!(book.is_empty());
    }

    #[test]
    fn test_sweep_two_levels_and_two_orders() {
        // Pre-state: SELL 5 @ 100 (moid 1), SELL 3 @ 101 (moid 2),
        // SELL 7 @ 101 (moid 3). Aggressor: BUY 12 @ 101.
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 5);
        add(&mut book, &mut sink, 1, 2, Side::Sell, 101, 3);
        add(&mut book, &mut sink, 2, 3, Side::Sell, 101, 7);
        sink.clear();

        add(&mut book, &mut sink, 3, 4, Side::Buy, 101, 12);

        let fills: Vec<(OrderId, Qty)> = sink
            .responses()
            .iter()
            .filter(|r| r.kind == ResponseKind::Filled && r.client_id != ClientId::new(3))
            .map(|r| (r.market_order_id, r.exec_qty))
            .collect();
        assert_eq!(
            fills,
            vec![
                (OrderId::new(1), Qty::new(5)),
                (OrderId::new(2), Qty::new(3)),
                (OrderId::new(3), Qty::new(4)),
            ]
        );

        let update_kinds: Vec<UpdateKind> = sink.updates().iter().map(|u| u.kind).collect();
        assert_eq!(
            update_kinds,
            vec![
                UpdateKind::Trade,
                UpdateKind::Cancel,
                UpdateKind::Trade,
                UpdateKind::Cancel,
                UpdateKind::Trade,
                UpdateKind::Modify,
            ]
        );
        let canceled: Vec<OrderId> = sink
            .updates()
            .iter()
            .filter(|u| u.kind == UpdateKind::Cancel)
            .map(|u| u.order_id)
            .collect();
        assert_eq!(canceled, vec![OrderId::new(1), OrderId::new(2)]);

        let modified: Vec<(OrderId, Qty)> = sink
            .updates()
            .iter()
            .filter(|u| u.kind == UpdateKind::Modify)
            .map(|u| (u.order_id, u.qty))
            .collect();
        assert_eq!(modified, vec![(OrderId::new(3), Qty::new(3))]);

        // Aggressor fully filled: no resting bid.
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), Some((Price::new(101), Qty::new(3))));
    }

    #[test]
    fn test_cancel_unknown_order_rejected() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        book.cancel(ClientId::new(1), OrderId::new(999), &mut sink);

        assert_eq!(sink.events.len(), 1);
        match sink.events[0] {
            Outbound::Response(r) => {
                assert_eq!(r.kind, ResponseKind::CancelRejected);
                assert_eq!(r.client_order_id, OrderId::new(999));
                assert_eq!(r.market_order_id, OrderId::INVALID);
            }
            _ => panic!("expected only a CANCEL_REJECTED response"),
        }
    }

    #[test]
    fn test_cancel_live_order() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 7, Side::Buy, 99, 10);
        sink.clear();

        book.cancel(ClientId::new(1), OrderId::new(7), &mut sink);
        book.check_invariants();

        // CANCEL market update precedes the CANCELED response.
        assert_eq!(sink.events.len(), 2);
        match sink.events[0] {
            Outbound::Update(u) => {
                assert_eq!(u.kind, UpdateKind::Cancel);
                assert_eq!(u.order_id, OrderId::new(1));
                assert_eq!(u.qty, Qty::ZERO);
                assert_eq!(u.priority, Priority::new(1));
            }
            _ => panic!("expected CANCEL update first"),
        }
        match sink.events[1] {
            Outbound::Response(r) => {
                assert_eq!(r.kind, ResponseKind::Canceled);
                assert_eq!(r.leaves_qty, Qty::new(10));
            }
            _ => panic!("expected CANCELED response second"),
        }
        assert!(book.is_empty());
    }

    #[test]
    fn test_client_order_id_reusable_after_dead() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 7, Side::Buy, 99, 10);
        book.cancel(ClientId::new(1), OrderId::new(7), &mut sink);
        sink.clear();

        add(&mut book, &mut sink, 1, 7, Side::Buy, 98, 5);
        assert_eq!(book.best_bid(), Some((Price::new(98), Qty::new(5))));

        sink.clear();
        book.cancel(ClientId::new(1), OrderId::new(7), &mut sink);
        assert_eq!(sink.responses()[0].kind, ResponseKind::Canceled);
    }

    #[test]
    fn test_fifo_priority_within_level() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 5);
        add(&mut book, &mut sink, 2, 2, Side::Sell, 100, 5);
        sink.clear();

        // Aggressor takes 5: the earlier order must fill, in full.
        add(&mut book, &mut sink, 3, 3, Side::Buy, 100, 5);
        let passive_fills: Vec<OrderId> = sink
            .responses()
            .iter()
            .filter(|r| r.kind == ResponseKind::Filled && r.client_id != ClientId::new(3))
            .map(|r| r.market_order_id)
            .collect();
        assert_eq!(passive_fills, vec![OrderId::new(1)]);

        let remaining = book.orders_at(Price::new(100));
        assert_eq!(remaining, vec![(OrderId::new(2), Qty::new(5), Priority::new(2))]);
    }

    #[test]
    fn test_ladder_stays_sorted_under_mixed_inserts() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        for (coid, price) in [(1, 95), (2, 99), (3, 97), (4, 91), (5, 98)] {
            add(&mut book, &mut sink, 1, coid, Side::Buy, price, 1);
        }
        for (coid, price) in [(6, 105), (7, 101), (8, 103), (9, 109), (10, 102)] {
            add(&mut book, &mut sink, 1, coid, Side::Sell, price, 1);
        }

        let bid_prices: Vec<i64> = book.side_prices(Side::Buy).iter().map(|p| p.ticks()).collect();
        assert_eq!(bid_prices, vec![99, 98, 97, 95, 91]);
        let ask_prices: Vec<i64> = book.side_prices(Side::Sell).iter().map(|p| p.ticks()).collect();
        assert_eq!(ask_prices, vec![101, 102, 103, 105, 109]);
    }

    #[test]
    fn test_market_order_ids_monotonic_even_when_fully_filled() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 5);
        sink.clear();

        // Fully filled aggressor still consumes moid 2.
        add(&mut book, &mut sink, 2, 2, Side::Buy, 100, 5);
        assert_eq!(sink.responses()[0].market_order_id, OrderId::new(2));

        sink.clear();
        add(&mut book, &mut sink, 1, 3, Side::Sell, 100, 5);
        assert_eq!(sink.responses()[0].market_order_id, OrderId::new(3));
    }

    #[test]
    fn test_priority_unique_per_price_across_level_rebuilds() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 5);
        // Level at 100 destroyed by a full fill…
        add(&mut book, &mut sink, 2, 2, Side::Buy, 100, 5);
        sink.clear();
        // …and rebuilt: the priority mint must not restart.
        add(&mut book, &mut sink, 1, 3, Side::Sell, 100, 5);
        let update = sink.updates()[0];
        assert_eq!(update.kind, UpdateKind::Add);
        assert_eq!(update.priority, Priority::new(2));
    }

    #[test]
    fn test_aggressive_buy_rests_residual_above_cleared_asks() {
        let mut book = book();
        let mut sink = RecordingSink::new();
        add(&mut book, &mut sink, 1, 1, Side::Sell, 100, 4);
        sink.clear();
        add(&mut book, &mut sink, 2, 2, Side::Buy, 102, 10);

        // 4 filled at 100, 6 rests at 102.
        assert_eq!(book.best_bid(), Some((Price::new(102), Qty::new(6))));
        assert_eq!(book.best_ask(), None);
        let last_update = *sink.updates().last().unwrap();
        assert_eq!(last_update.kind, UpdateKind::Add);
        assert_eq!(last_update.price, Price::new(102));
        assert_eq!(last_update.qty, Qty::new(6));
    }
}
