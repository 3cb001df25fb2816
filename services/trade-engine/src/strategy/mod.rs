//! Trading strategies
//!
//! Exactly one strategy runs per client. The market maker quotes both
//! sides around the fair price; the liquidity taker lifts the touch on
//! strong prints. The random flow used for exercising the exchange
//! sends its own requests from the binary and needs no callbacks here.

pub mod liquidity_taker;
pub mod market_maker;

use market_data::Bbo;
use tracing::debug;
use types::config::{AlgoKind, TickerConfig};
use types::ids::TickerId;
use types::messages::{ClientResponse, MarketUpdate};

use crate::feature::FeatureEngine;
use crate::order_manager::{OmContext, OrderManager};

pub use liquidity_taker::LiquidityTaker;
pub use market_maker::MarketMaker;

/// The strategy owned by one trade engine.
pub enum Strategy {
    Maker(MarketMaker),
    Taker(LiquidityTaker),
    /// No strategy callbacks (random flow drives the exchange from
    /// outside the engine).
    Passive,
}

impl Strategy {
    pub fn from_algo(algo: AlgoKind, ticker_cfg: &[TickerConfig]) -> Self {
        match algo {
            AlgoKind::Maker => Strategy::Maker(MarketMaker::new(ticker_cfg)),
            AlgoKind::Taker => Strategy::Taker(LiquidityTaker::new(ticker_cfg)),
            AlgoKind::Random => Strategy::Passive,
        }
    }

    pub fn on_book_update(
        &mut self,
        ticker_id: TickerId,
        bbo: &Bbo,
        features: &FeatureEngine,
        om: &mut OrderManager,
        ctx: &mut OmContext<'_>,
    ) {
        match self {
            Strategy::Maker(maker) => maker.on_book_update(ticker_id, bbo, features, om, ctx),
            Strategy::Taker(taker) => taker.on_book_update(ticker_id, bbo),
            Strategy::Passive => debug!(ticker = %ticker_id, "book update (passive)"),
        }
    }

    pub fn on_trade_update(
        &mut self,
        update: &MarketUpdate,
        bbo: &Bbo,
        features: &FeatureEngine,
        om: &mut OrderManager,
        ctx: &mut OmContext<'_>,
    ) {
        match self {
            Strategy::Maker(maker) => maker.on_trade_update(update),
            Strategy::Taker(taker) => taker.on_trade_update(update, bbo, features, om, ctx),
            Strategy::Passive => debug!(kind = update.kind.label(), "trade update (passive)"),
        }
    }

    pub fn on_order_update(&mut self, response: &ClientResponse, om: &mut OrderManager) {
        match self {
            Strategy::Maker(_) | Strategy::Taker(_) => om.on_order_update(response),
            Strategy::Passive => debug!(kind = ?response.kind, "order update (passive)"),
        }
    }
}
