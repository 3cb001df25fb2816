//! Order manager
//!
//! Hides order lifecycle plumbing from the strategies. Exactly one
//! order slot exists per (ticker, side); `move_orders` reconciles the
//! pair toward the strategy's desired prices, sending NEW and CANCEL
//! requests as needed and never acting on a slot that is awaiting an
//! acknowledgement. Every NEW passes the pre-trade risk gate first.

use perf::Producer;
use tracing::{debug, info};
use types::ids::{ClientId, OrderId, TickerId};
use types::messages::{ClientRequest, ClientResponse, RequestKind, ResponseKind};
use types::numeric::{Price, Qty};
use types::side::Side;
use types::MAX_TICKERS;

use risk_engine::{PositionKeeper, RiskCheckResult, RiskEngine};

/// Lifecycle of one managed order slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OmOrderState {
    #[default]
    Invalid,
    /// NEW sent, not yet acknowledged.
    PendingNew,
    /// Resting on the exchange.
    Live,
    /// CANCEL sent, not yet acknowledged.
    PendingCancel,
    /// Fully filled or canceled; the slot may be reused.
    Dead,
}

/// The single managed order for one (ticker, side).
#[derive(Debug, Clone, Copy)]
pub struct OmOrder {
    pub ticker_id: TickerId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub state: OmOrderState,
}

impl Default for OmOrder {
    fn default() -> Self {
        Self {
            ticker_id: TickerId::INVALID,
            order_id: OrderId::INVALID,
            side: Side::Invalid,
            price: Price::INVALID,
            qty: Qty::INVALID,
            state: OmOrderState::Invalid,
        }
    }
}

/// Everything `move_order` needs from its owner, passed per call so
/// the manager stores no back-references.
pub struct OmContext<'a> {
    pub client_id: ClientId,
    pub risk: &'a RiskEngine,
    pub positions: &'a PositionKeeper,
    pub requests: &'a mut Producer<ClientRequest>,
}

/// One order slot per (ticker, side) plus the client-scoped order-id
/// mint.
pub struct OrderManager {
    slots: Vec<[OmOrder; 2]>,
    next_order_id: u64,
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            slots: vec![[OmOrder::default(); 2]; MAX_TICKERS],
            next_order_id: 1,
        }
    }

    /// The managed slot for one (ticker, side).
    pub fn order(&self, ticker_id: TickerId, side: Side) -> &OmOrder {
        &self.slots[ticker_id.index()][side.index()]
    }

    /// Transition the matched slot on a client response.
    pub fn on_order_update(&mut self, response: &ClientResponse) {
        debug!(kind = ?response.kind, order = %response.client_order_id, "order update");

        // Rejected cancels and invalid responses carry no side and
        // cause no transition.
        if matches!(
            response.kind,
            ResponseKind::CancelRejected | ResponseKind::Invalid
        ) {
            return;
        }

        let slot = &mut self.slots[response.ticker_id.index()][response.side.index()];
        match response.kind {
            ResponseKind::Accepted => slot.state = OmOrderState::Live,
            ResponseKind::Canceled => slot.state = OmOrderState::Dead,
            ResponseKind::Filled => {
                slot.qty = response.leaves_qty;
                if slot.qty.is_zero() {
                    slot.state = OmOrderState::Dead;
                }
            }
            ResponseKind::CancelRejected | ResponseKind::Invalid => unreachable!(),
        }
    }

    /// Reconcile both sides of one ticker toward the desired quote.
    /// An invalid price means "no order wanted on that side".
    pub fn move_orders(
        &mut self,
        ticker_id: TickerId,
        bid_price: Price,
        ask_price: Price,
        clip: Qty,
        ctx: &mut OmContext<'_>,
    ) {
        self.move_order(ticker_id, Side::Buy, bid_price, clip, ctx);
        self.move_order(ticker_id, Side::Sell, ask_price, clip, ctx);
    }

    /// Reconcile a single slot toward `price`:
    /// - LIVE at the right price: nothing to do;
    /// - LIVE at the wrong price: cancel (the replacement goes out
    ///   once the cancel acks);
    /// - DEAD/INVALID with a valid price: risk-check then send NEW;
    /// - awaiting an ack: nothing until the exchange answers.
    pub fn move_order(
        &mut self,
        ticker_id: TickerId,
        side: Side,
        price: Price,
        qty: Qty,
        ctx: &mut OmContext<'_>,
    ) {
        let state = self.slots[ticker_id.index()][side.index()].state;
        match state {
            OmOrderState::Live => {
                if self.slots[ticker_id.index()][side.index()].price != price {
                    self.cancel_order(ticker_id, side, ctx);
                }
            }
            OmOrderState::Invalid | OmOrderState::Dead => {
                if price.is_valid() {
                    let result = ctx.risk.check_pre_trade(ctx.positions, ticker_id, side, qty);
                    if result == RiskCheckResult::Allowed {
                        self.new_order(ticker_id, side, price, qty, ctx);
                    } else {
                        info!(
                            ticker = %ticker_id,
                            %side,
                            %qty,
                            result = result.label(),
                            "order suppressed by risk check"
                        );
                    }
                }
            }
            OmOrderState::PendingNew | OmOrderState::PendingCancel => {}
        }
    }

    fn new_order(
        &mut self,
        ticker_id: TickerId,
        side: Side,
        price: Price,
        qty: Qty,
        ctx: &mut OmContext<'_>,
    ) {
        let order_id = OrderId::new(self.next_order_id);
        self.next_order_id += 1;

        ctx.requests.push_spin(ClientRequest {
            kind: RequestKind::New,
            client_id: ctx.client_id,
            ticker_id,
            order_id,
            side,
            price,
            qty,
        });

        self.slots[ticker_id.index()][side.index()] = OmOrder {
            ticker_id,
            order_id,
            side,
            price,
            qty,
            state: OmOrderState::PendingNew,
        };
        debug!(ticker = %ticker_id, %side, %price, %qty, order = %order_id, "sent NEW");
    }

    fn cancel_order(&mut self, ticker_id: TickerId, side: Side, ctx: &mut OmContext<'_>) {
        let slot = &mut self.slots[ticker_id.index()][side.index()];

        ctx.requests.push_spin(ClientRequest {
            kind: RequestKind::Cancel,
            client_id: ctx.client_id,
            ticker_id,
            order_id: slot.order_id,
            side,
            price: slot.price,
            qty: slot.qty,
        });

        slot.state = OmOrderState::PendingCancel;
        debug!(ticker = %ticker_id, %side, order = %slot.order_id, "sent CANCEL");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perf::Consumer;
    use rust_decimal::Decimal;
    use types::config::{RiskConfig, TickerConfig};

    struct Fixture {
        om: OrderManager,
        risk: RiskEngine,
        positions: PositionKeeper,
        requests_tx: Producer<ClientRequest>,
        requests_rx: Consumer<ClientRequest>,
    }

    fn fixture(max_order: u64) -> Fixture {
        let (requests_tx, requests_rx) = perf::ring(64);
        Fixture {
            om: OrderManager::new(),
            risk: RiskEngine::new(&[TickerConfig {
                clip: Qty::new(5),
                threshold: Decimal::ONE,
                risk: RiskConfig {
                    max_order_size: Qty::new(max_order),
                    max_position: 1000,
                    max_loss: Decimal::from(-10_000),
                },
            }]),
            positions: PositionKeeper::new(),
            requests_tx,
            requests_rx,
        }
    }

    fn move_order(f: &mut Fixture, side: Side, price: i64, qty: u64) {
        let mut ctx = OmContext {
            client_id: ClientId::new(1),
            risk: &f.risk,
            positions: &f.positions,
            requests: &mut f.requests_tx,
        };
        f.om
            .move_order(TickerId::new(0), side, Price::new(price), Qty::new(qty), &mut ctx);
    }

    fn response(kind: ResponseKind, side: Side, order_id: u64, leaves: u64) -> ClientResponse {
        ClientResponse {
            kind,
            client_id: ClientId::new(1),
            ticker_id: TickerId::new(0),
            client_order_id: OrderId::new(order_id),
            market_order_id: OrderId::new(100 + order_id),
            side,
            price: Price::new(100),
            exec_qty: Qty::ZERO,
            leaves_qty: Qty::new(leaves),
        }
    }

    #[test]
    fn test_new_order_flow() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Buy, 99, 5);

        let request = f.requests_rx.try_pop().unwrap();
        assert_eq!(request.kind, RequestKind::New);
        assert_eq!(request.order_id, OrderId::new(1));
        assert_eq!(request.price, Price::new(99));

        let slot = *f.om.order(TickerId::new(0), Side::Buy);
        assert_eq!(slot.state, OmOrderState::PendingNew);

        // Pending slots ignore further moves.
        move_order(&mut f, Side::Buy, 98, 5);
        assert!(f.requests_rx.try_pop().is_none());

        // ACCEPTED → LIVE.
        f.om.on_order_update(&response(ResponseKind::Accepted, Side::Buy, 1, 5));
        assert_eq!(f.om.order(TickerId::new(0), Side::Buy).state, OmOrderState::Live);
    }

    #[test]
    fn test_live_same_price_is_noop() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Buy, 99, 5);
        f.om.on_order_update(&response(ResponseKind::Accepted, Side::Buy, 1, 5));
        f.requests_rx.try_pop().unwrap();

        move_order(&mut f, Side::Buy, 99, 5);
        assert!(f.requests_rx.try_pop().is_none());
        assert_eq!(f.om.order(TickerId::new(0), Side::Buy).state, OmOrderState::Live);
    }

    #[test]
    fn test_live_price_change_cancels_then_replaces() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Buy, 99, 5);
        f.om.on_order_update(&response(ResponseKind::Accepted, Side::Buy, 1, 5));
        f.requests_rx.try_pop().unwrap();

        // Price moved: a CANCEL goes out, slot pends.
        move_order(&mut f, Side::Buy, 98, 5);
        let cancel = f.requests_rx.try_pop().unwrap();
        assert_eq!(cancel.kind, RequestKind::Cancel);
        assert_eq!(cancel.order_id, OrderId::new(1));
        assert_eq!(
            f.om.order(TickerId::new(0), Side::Buy).state,
            OmOrderState::PendingCancel
        );

        // While pending nothing more goes out.
        move_order(&mut f, Side::Buy, 98, 5);
        assert!(f.requests_rx.try_pop().is_none());

        // CANCELED → DEAD, and the next move re-quotes.
        f.om.on_order_update(&response(ResponseKind::Canceled, Side::Buy, 1, 5));
        assert_eq!(f.om.order(TickerId::new(0), Side::Buy).state, OmOrderState::Dead);
        move_order(&mut f, Side::Buy, 98, 5);
        let request = f.requests_rx.try_pop().unwrap();
        assert_eq!(request.kind, RequestKind::New);
        assert_eq!(request.order_id, OrderId::new(2));
        assert_eq!(request.price, Price::new(98));
    }

    #[test]
    fn test_invalid_price_means_no_order() {
        let mut f = fixture(100);
        let mut ctx = OmContext {
            client_id: ClientId::new(1),
            risk: &f.risk,
            positions: &f.positions,
            requests: &mut f.requests_tx,
        };
        f.om.move_orders(
            TickerId::new(0),
            Price::INVALID,
            Price::INVALID,
            Qty::new(5),
            &mut ctx,
        );
        assert!(f.requests_rx.try_pop().is_none());
        assert_eq!(
            f.om.order(TickerId::new(0), Side::Buy).state,
            OmOrderState::Invalid
        );
    }

    #[test]
    fn test_risk_denial_suppresses_new() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Buy, 99, 200); // above max_order_size
        assert!(f.requests_rx.try_pop().is_none());
        assert_eq!(
            f.om.order(TickerId::new(0), Side::Buy).state,
            OmOrderState::Invalid
        );
    }

    #[test]
    fn test_fill_transitions() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Sell, 101, 5);
        f.om.on_order_update(&response(ResponseKind::Accepted, Side::Sell, 1, 5));

        // Partial fill keeps the slot live with reduced qty.
        f.om.on_order_update(&response(ResponseKind::Filled, Side::Sell, 1, 2));
        let slot = *f.om.order(TickerId::new(0), Side::Sell);
        assert_eq!(slot.state, OmOrderState::Live);
        assert_eq!(slot.qty, Qty::new(2));

        // Full fill kills it.
        f.om.on_order_update(&response(ResponseKind::Filled, Side::Sell, 1, 0));
        assert_eq!(f.om.order(TickerId::new(0), Side::Sell).state, OmOrderState::Dead);
    }

    #[test]
    fn test_cancel_reject_causes_no_transition() {
        let mut f = fixture(100);
        move_order(&mut f, Side::Buy, 99, 5);
        f.om.on_order_update(&response(ResponseKind::Accepted, Side::Buy, 1, 5));

        let mut reject = response(ResponseKind::CancelRejected, Side::Invalid, 1, 0);
        reject.side = Side::Invalid;
        f.om.on_order_update(&reject);
        assert_eq!(f.om.order(TickerId::new(0), Side::Buy).state, OmOrderState::Live);
    }
}
