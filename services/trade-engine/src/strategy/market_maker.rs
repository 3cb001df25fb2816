//! Market making strategy
//!
//! On every book update, read the fair price from the feature engine
//! and quote both sides of the touch. A side whose distance to fair is
//! at least the configured threshold quotes at the touch; a side too
//! close to fair shades one tick away from it. The order manager turns
//! the desired quote into the minimal cancel/replace traffic.

use market_data::Bbo;
use tracing::{debug, trace};
use types::config::TickerConfig;
use types::ids::TickerId;
use types::messages::MarketUpdate;
use types::MAX_TICKERS;

use crate::feature::FeatureEngine;
use crate::order_manager::{OmContext, OrderManager};

pub struct MarketMaker {
    ticker_cfg: Vec<TickerConfig>,
}

impl MarketMaker {
    pub fn new(ticker_cfg: &[TickerConfig]) -> Self {
        let mut ticker_cfg = ticker_cfg.to_vec();
        ticker_cfg.resize(MAX_TICKERS, TickerConfig::default());
        Self { ticker_cfg }
    }

    /// Requote around the new top of book.
    pub fn on_book_update(
        &mut self,
        ticker_id: TickerId,
        bbo: &Bbo,
        features: &FeatureEngine,
        om: &mut OrderManager,
        ctx: &mut OmContext<'_>,
    ) {
        let Some(fair_price) = features.market_price() else {
            return;
        };
        if !bbo.is_two_sided() {
            return;
        }

        let cfg = &self.ticker_cfg[ticker_id.index()];
        let threshold = cfg.threshold;

        let bid = bbo.bid_price.as_decimal();
        let ask = bbo.ask_price.as_decimal();
        let bid_price = if fair_price - bid >= threshold {
            bbo.bid_price
        } else {
            bbo.bid_price.offset(-1)
        };
        let ask_price = if ask - fair_price >= threshold {
            bbo.ask_price
        } else {
            bbo.ask_price.offset(1)
        };

        debug!(
            ticker = %ticker_id,
            %fair_price,
            bid = %bid_price,
            ask = %ask_price,
            "requoting"
        );
        om.move_orders(ticker_id, bid_price, ask_price, cfg.clip, ctx);
    }

    /// Trades carry no extra signal for the maker.
    pub fn on_trade_update(&mut self, update: &MarketUpdate) {
        trace!(kind = update.kind.label(), qty = %update.qty, "trade observed");
    }
}
