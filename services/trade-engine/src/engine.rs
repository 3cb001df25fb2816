//! Trade engine dispatcher
//!
//! Single-threaded event loop over the client's two inbound rings.
//! Each iteration drains every available client response (fills feed
//! the position keeper, then the strategy sees the response), then
//! every available market update (the ticker's book applies it and the
//! resulting notice fans out to the position keeper's BBO mark, the
//! feature engine, and the strategy). The strategy's order decisions
//! leave through the outbound request ring via the order manager.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use perf::{Consumer, Producer};
use tracing::{debug, info, trace};

use market_data::{Bbo, BookNotice, MarketOrderBook};
use risk_engine::{PositionKeeper, RiskEngine};
use types::config::{AlgoKind, TickerConfig};
use types::ids::{ClientId, TickerId};
use types::messages::{ClientRequest, ClientResponse, MarketUpdate, ResponseKind};
use types::MAX_TICKERS;

use crate::feature::FeatureEngine;
use crate::order_manager::{OmContext, OrderManager};
use crate::strategy::Strategy;

/// Shared record of when the engine last saw an event; the binary
/// polls it to decide when the session has gone quiet.
pub struct ActivityTracker {
    started: Instant,
    last_event_ms: AtomicU64,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_event_ms: AtomicU64::new(0),
        }
    }

    /// Record that an event just happened.
    pub fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_event_ms.store(elapsed, Ordering::Release);
    }

    /// Whole seconds since the last recorded event.
    pub fn silent_seconds(&self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        now.saturating_sub(self.last_event_ms.load(Ordering::Acquire)) / 1000
    }
}

/// The trading client's dispatcher.
pub struct TradeEngine {
    client_id: ClientId,
    books: Vec<MarketOrderBook>,
    features: FeatureEngine,
    positions: PositionKeeper,
    risk: RiskEngine,
    om: OrderManager,
    strategy: Strategy,
    /// Outbound order path; absent for the random flow, whose orders
    /// originate outside the engine (the ring's single producer lives
    /// there instead).
    requests: Option<Producer<ClientRequest>>,
    responses: Consumer<ClientResponse>,
    updates: Consumer<MarketUpdate>,
    run: Arc<AtomicBool>,
    tracker: Arc<ActivityTracker>,
}

impl TradeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: ClientId,
        algo: AlgoKind,
        ticker_cfg: &[TickerConfig],
        requests: Option<Producer<ClientRequest>>,
        responses: Consumer<ClientResponse>,
        updates: Consumer<MarketUpdate>,
        run: Arc<AtomicBool>,
        tracker: Arc<ActivityTracker>,
    ) -> Self {
        assert!(
            requests.is_some() || algo == AlgoKind::Random,
            "an order-sending strategy needs the request ring"
        );
        let books = (0..MAX_TICKERS)
            .map(|i| MarketOrderBook::new(TickerId::new(i as u32)))
            .collect();
        info!(client = %client_id, algo = %algo, "trade engine initialized");

        Self {
            client_id,
            books,
            features: FeatureEngine::new(),
            positions: PositionKeeper::new(),
            risk: RiskEngine::new(ticker_cfg),
            om: OrderManager::new(),
            strategy: Strategy::from_algo(algo, ticker_cfg),
            requests,
            responses,
            updates,
            run,
            tracker,
        }
    }

    /// Thread body. On shutdown the loop keeps draining until both
    /// inbound rings are empty, so nothing in flight is dropped.
    pub fn run(&mut self) {
        info!("trade engine running");
        while self.run.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        while self.poll() > 0 {}

        let (pnl, volume) = self.positions.totals();
        info!(%pnl, %volume, "trade engine stopped");
    }

    /// Drain both inbound rings once; returns how many events were
    /// handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Some(response) = self.responses.try_pop() {
            self.on_order_update(&response);
            handled += 1;
        }
        while let Some(update) = self.updates.try_pop() {
            self.on_market_update(&update);
            handled += 1;
        }
        if handled > 0 {
            self.tracker.touch();
        }
        handled
    }

    /// One client response: fills feed the position keeper, then the
    /// strategy reacts (keeping its order manager in step).
    fn on_order_update(&mut self, response: &ClientResponse) {
        debug!(kind = ?response.kind, order = %response.client_order_id, "response");
        if response.kind == ResponseKind::Filled {
            self.positions.add_fill(response);
        }
        self.strategy.on_order_update(response, &mut self.om);
    }

    /// One market update: apply to the ticker's book, then fan the
    /// notice out. An unknown ticker id is a broken feed and fatal.
    fn on_market_update(&mut self, update: &MarketUpdate) {
        assert!(
            update.ticker_id.index() < self.books.len(),
            "unknown ticker id on update: {:?}",
            update
        );

        let book = &mut self.books[update.ticker_id.index()];
        let notice = book.apply(update);
        let bbo = *book.bbo();

        match notice {
            BookNotice::Trade(trade) => {
                self.features.on_trade_update(&trade, &bbo);
                self.dispatch_trade(&trade, &bbo);
            }
            BookNotice::OrderBook { .. } => {
                self.positions.update_bbo(update.ticker_id, &bbo);
                self.features.on_book_update(update.ticker_id, &bbo);
                self.dispatch_book(update.ticker_id, &bbo);
            }
        }
    }

    fn dispatch_book(&mut self, ticker_id: TickerId, bbo: &Bbo) {
        let Self {
            client_id,
            risk,
            positions,
            requests,
            strategy,
            om,
            features,
            ..
        } = self;
        match requests.as_mut() {
            Some(requests) => {
                let mut ctx = OmContext {
                    client_id: *client_id,
                    risk,
                    positions,
                    requests,
                };
                strategy.on_book_update(ticker_id, bbo, features, om, &mut ctx);
            }
            None => trace!(ticker = %ticker_id, "book update with no order path"),
        }
    }

    fn dispatch_trade(&mut self, trade: &MarketUpdate, bbo: &Bbo) {
        let Self {
            client_id,
            risk,
            positions,
            requests,
            strategy,
            om,
            features,
            ..
        } = self;
        match requests.as_mut() {
            Some(requests) => {
                let mut ctx = OmContext {
                    client_id: *client_id,
                    risk,
                    positions,
                    requests,
                };
                strategy.on_trade_update(trade, bbo, features, om, &mut ctx);
            }
            None => trace!("trade update with no order path"),
        }
    }

    pub fn positions(&self) -> &PositionKeeper {
        &self.positions
    }

    pub fn book(&self, ticker_id: TickerId) -> &MarketOrderBook {
        &self.books[ticker_id.index()]
    }

    /// The order manager's slot for one (ticker, side).
    pub fn om_order(&self, ticker_id: TickerId, side: types::side::Side) -> &crate::OmOrder {
        self.om.order(ticker_id, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use types::config::RiskConfig;
    use types::ids::OrderId;
    use types::messages::{RequestKind, UpdateKind};
    use types::numeric::{Price, Priority, Qty};
    use types::side::Side;

    struct Harness {
        engine: TradeEngine,
        requests_rx: Consumer<ClientRequest>,
        responses_tx: Producer<ClientResponse>,
        updates_tx: Producer<MarketUpdate>,
    }

    fn harness(algo: AlgoKind) -> Harness {
        let cfg = TickerConfig {
            clip: Qty::new(5),
            threshold: Decimal::from_str_exact("0.5").unwrap(),
            risk: RiskConfig {
                max_order_size: Qty::new(100),
                max_position: 1000,
                max_loss: Decimal::from(-100_000),
            },
        };
        let (requests_tx, requests_rx) = perf::ring(256);
        let (responses_tx, responses_rx) = perf::ring(256);
        let (updates_tx, updates_rx) = perf::ring(256);
        let engine = TradeEngine::new(
            ClientId::new(7),
            algo,
            &[cfg],
            Some(requests_tx),
            responses_rx,
            updates_rx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(ActivityTracker::new()),
        );
        Harness {
            engine,
            requests_rx,
            responses_tx,
            updates_tx,
        }
    }

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

    #[test]
    fn test_maker_quotes_after_two_sided_book() {
        let mut h = harness(AlgoKind::Maker);
        // Two adds per side: the cached top only refreshes on a touch
        // of a side that already has depth.
        h.updates_tx.try_push(add(1, Side::Buy, 99, 10, 1)).unwrap();
        h.updates_tx.try_push(add(2, Side::Buy, 99, 10, 2)).unwrap();
        h.updates_tx.try_push(add(3, Side::Sell, 101, 10, 1)).unwrap();
        h.updates_tx.try_push(add(4, Side::Sell, 101, 10, 2)).unwrap();
        h.engine.poll();

        // fair = 100, both gaps 1 ≥ 0.5: quotes at 99 and 101.
        let bid = h.requests_rx.try_pop().unwrap();
        let ask = h.requests_rx.try_pop().unwrap();
        assert_eq!(bid.kind, RequestKind::New);
        assert_eq!(bid.client_id, ClientId::new(7));
        assert_eq!((bid.side, bid.price), (Side::Buy, Price::new(99)));
        assert_eq!((ask.side, ask.price), (Side::Sell, Price::new(101)));
    }

    #[test]
    fn test_fill_reaches_position_keeper() {
        let mut h = harness(AlgoKind::Maker);
        h.responses_tx
            .try_push(ClientResponse {
                kind: ResponseKind::Filled,
                client_id: ClientId::new(7),
                ticker_id: TickerId::new(0),
                client_order_id: OrderId::new(1),
                market_order_id: OrderId::new(1),
                side: Side::Buy,
                price: Price::new(100),
                exec_qty: Qty::new(4),
                leaves_qty: Qty::new(1),
            })
            .unwrap();
        h.engine.poll();

        assert_eq!(h.engine.positions().position(TickerId::new(0)).position, 4);
    }

    #[test]
    fn test_trade_print_reaches_taker() {
        let mut h = harness(AlgoKind::Taker);
        h.updates_tx.try_push(add(1, Side::Buy, 99, 10, 1)).unwrap();
        h.updates_tx.try_push(add(2, Side::Buy, 99, 10, 2)).unwrap();
        h.updates_tx.try_push(add(3, Side::Sell, 101, 10, 1)).unwrap();
        h.updates_tx.try_push(add(4, Side::Sell, 101, 10, 2)).unwrap();
        h.engine.poll();
        assert!(h.requests_rx.try_pop().is_none()); // taker ignores book updates

        // Strong buy print: 10 of the 20 resting at the ask.
        h.updates_tx
            .try_push(MarketUpdate {
                kind: UpdateKind::Trade,
                side: Side::Buy,
                price: Price::new(101),
                qty: Qty::new(10),
                ticker_id: TickerId::new(0),
                ..MarketUpdate::default()
            })
            .unwrap();
        h.engine.poll();

        let request = h.requests_rx.try_pop().unwrap();
        assert_eq!(request.side, Side::Buy);
        assert_eq!(request.price, Price::new(101));
    }

    #[test]
    fn test_activity_tracker_touched_by_events() {
        let mut h = harness(AlgoKind::Maker);
        let tracker = Arc::clone(&h.engine.tracker);
        h.updates_tx.try_push(add(1, Side::Buy, 99, 10, 1)).unwrap();
        h.engine.poll();
        assert_eq!(tracker.silent_seconds(), 0);
    }

    #[test]
    #[should_panic(expected = "unknown ticker id")]
    fn test_unknown_ticker_is_fatal() {
        let mut h = harness(AlgoKind::Maker);
        let mut update = add(1, Side::Buy, 99, 10, 1);
        update.ticker_id = TickerId::new(u32::MAX - 1);
        h.updates_tx.try_push(update).unwrap();
        h.engine.poll();
    }

    #[test]
    #[should_panic(expected = "needs the request ring")]
    fn test_active_strategy_without_request_ring_is_rejected() {
        let (_responses_tx, responses_rx) = perf::ring::<ClientResponse>(16);
        let (_updates_tx, updates_rx) = perf::ring::<MarketUpdate>(16);
        TradeEngine::new(
            ClientId::new(1),
            AlgoKind::Maker,
            &[],
            None,
            responses_rx,
            updates_rx,
            Arc::new(AtomicBool::new(true)),
            Arc::new(ActivityTracker::new()),
        );
    }
}
