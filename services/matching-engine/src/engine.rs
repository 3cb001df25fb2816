//! Matching engine thread
//!
//! Owns one book per ticker and the three ring endpoints: inbound
//! client requests, outbound client responses, outbound market
//! updates. Requests are processed strictly in arrival order, which is
//! what fixes market-order-id and priority assignment; everything a
//! single request produces is enqueued contiguously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use perf::{Consumer, Producer};
use tracing::{debug, info};
use types::messages::{ClientRequest, ClientResponse, MarketUpdate, RequestKind};
use types::MAX_TICKERS;

use crate::book::OrderBook;
use crate::events::OutboundSink;
use types::ids::TickerId;

/// Sink that publishes onto the outbound rings, spinning when full so
/// fullness back-pressures the request queue instead of dropping data.
struct QueueSink<'a> {
    responses: &'a mut Producer<ClientResponse>,
    updates: &'a mut Producer<MarketUpdate>,
}

impl OutboundSink for QueueSink<'_> {
    fn on_response(&mut self, response: ClientResponse) {
        self.responses.push_spin(response);
    }

    fn on_update(&mut self, update: MarketUpdate) {
        self.updates.push_spin(update);
    }
}

/// The exchange-side matching engine.
pub struct MatchingEngine {
    books: Vec<OrderBook>,
    requests: Consumer<ClientRequest>,
    responses: Producer<ClientResponse>,
    updates: Producer<MarketUpdate>,
    run: Arc<AtomicBool>,
}

impl MatchingEngine {
    pub fn new(
        requests: Consumer<ClientRequest>,
        responses: Producer<ClientResponse>,
        updates: Producer<MarketUpdate>,
        run: Arc<AtomicBool>,
    ) -> Self {
        let books = (0..MAX_TICKERS)
            .map(|i| OrderBook::new(TickerId::new(i as u32)))
            .collect();
        info!(tickers = MAX_TICKERS, "matching engine initialized");
        Self {
            books,
            requests,
            responses,
            updates,
            run,
        }
    }

    /// Thread body: serve requests until the run flag clears, then
    /// drain the backlog so nothing in flight is abandoned.
    pub fn run(&mut self) {
        info!("matching engine running");
        while self.run.load(Ordering::Acquire) {
            match self.requests.try_pop() {
                Some(request) => self.process(request),
                None => std::hint::spin_loop(),
            }
        }
        while let Some(request) = self.requests.try_pop() {
            self.process(request);
        }
        info!("matching engine stopped");
    }

    /// Dispatch one client request to its ticker's book. A request
    /// kind outside NEW/CANCEL is a programming error upstream, not a
    /// user error, and dies here.
    pub fn process(&mut self, request: ClientRequest) {
        debug!(
            kind = ?request.kind,
            client = %request.client_id,
            ticker = %request.ticker_id,
            order = %request.order_id,
            "processing request"
        );

        let Self {
            books,
            responses,
            updates,
            ..
        } = self;
        let book = &mut books[request.ticker_id.index()];
        let mut sink = QueueSink { responses, updates };

        match request.kind {
            RequestKind::New => book.add(
                request.client_id,
                request.order_id,
                request.side,
                request.price,
                request.qty,
                &mut sink,
            ),
            RequestKind::Cancel => book.cancel(request.client_id, request.order_id, &mut sink),
            RequestKind::Invalid => panic!("invalid client request kind: {:?}", request),
        }
    }

    /// The book for one ticker (tests and shutdown reporting).
    pub fn book(&self, ticker_id: TickerId) -> &OrderBook {
        &self.books[ticker_id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{ClientId, OrderId};
    use types::numeric::{Price, Qty};
    use types::side::Side;

    fn new_request(client: u32, ticker: u32, coid: u64, side: Side, price: i64, qty: u64) -> ClientRequest {
        ClientRequest {
            kind: RequestKind::New,
            client_id: ClientId::new(client),
            ticker_id: TickerId::new(ticker),
            order_id: OrderId::new(coid),
            side,
            price: Price::new(price),
            qty: Qty::new(qty),
        }
    }

    #[test]
    fn test_engine_routes_to_ticker_book() {
        let (_req_tx, req_rx) = perf::ring(16);
        let (resp_tx, mut resp_rx) = perf::ring(16);
        let (upd_tx, mut upd_rx) = perf::ring(16);
        let run = Arc::new(AtomicBool::new(false));
        let mut engine = MatchingEngine::new(req_rx, resp_tx, upd_tx, run);

        engine.process(new_request(1, 0, 1, Side::Sell, 100, 10));
        engine.process(new_request(1, 2, 2, Side::Sell, 200, 5));

        assert_eq!(
            engine.book(TickerId::new(0)).best_ask(),
            Some((Price::new(100), Qty::new(10)))
        );
        assert_eq!(
            engine.book(TickerId::new(2)).best_ask(),
            Some((Price::new(200), Qty::new(5)))
        );
        assert_eq!(engine.book(TickerId::new(1)).best_ask(), None);

        // Two accepts, two adds.
        let mut responses = Vec::new();
        while let Some(r) = resp_rx.try_pop() {
            responses.push(r);
        }
        assert_eq!(responses.len(), 2);

        let mut updates = Vec::new();
        while let Some(u) = upd_rx.try_pop() {
            updates.push(u);
        }
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].ticker_id, TickerId::new(0));
        assert_eq!(updates[1].ticker_id, TickerId::new(2));
    }

    #[test]
    fn test_cross_ticker_market_order_ids_independent() {
        let (_req_tx, req_rx) = perf::ring(16);
        let (resp_tx, mut resp_rx) = perf::ring(16);
        let (upd_tx, _upd_rx) = perf::ring(16);
        let run = Arc::new(AtomicBool::new(false));
        let mut engine = MatchingEngine::new(req_rx, resp_tx, upd_tx, run);

        engine.process(new_request(1, 0, 1, Side::Buy, 50, 1));
        engine.process(new_request(1, 1, 2, Side::Buy, 50, 1));

        let a = resp_rx.try_pop().unwrap();
        let b = resp_rx.try_pop().unwrap();
        // Each book mints from 1 independently.
        assert_eq!(a.market_order_id, OrderId::new(1));
        assert_eq!(b.market_order_id, OrderId::new(1));
    }

    #[test]
    fn test_run_drains_backlog_after_stop() {
        let (mut req_tx, req_rx) = perf::ring(16);
        let (resp_tx, mut resp_rx) = perf::ring(16);
        let (upd_tx, _upd_rx) = perf::ring(16);
        // Flag already cleared: the serve loop never runs, the
        // backlog must still be processed before run() returns.
        let run = Arc::new(AtomicBool::new(false));
        req_tx.push_spin(new_request(1, 0, 1, Side::Sell, 100, 10));
        req_tx.push_spin(new_request(1, 0, 2, Side::Sell, 101, 5));

        let mut engine = MatchingEngine::new(req_rx, resp_tx, upd_tx, run);
        engine.run();

        let mut accepted = 0;
        while let Some(response) = resp_rx.try_pop() {
            assert_eq!(response.kind, types::messages::ResponseKind::Accepted);
            accepted += 1;
        }
        assert_eq!(accepted, 2);
        assert_eq!(
            engine.book(TickerId::new(0)).best_ask(),
            Some((Price::new(100), Qty::new(10)))
        );
    }

    #[test]
    #[should_panic(expected = "invalid client request kind")]
    fn test_invalid_request_kind_is_fatal() {
        let (_req_tx, req_rx) = perf::ring(16);
        let (resp_tx, _resp_rx) = perf::ring(16);
        let (upd_tx, _upd_rx) = perf::ring(16);
        let run = Arc::new(AtomicBool::new(false));
        let mut engine = MatchingEngine::new(req_rx, resp_tx, upd_tx, run);

        engine.process(ClientRequest::default());
    }
}
