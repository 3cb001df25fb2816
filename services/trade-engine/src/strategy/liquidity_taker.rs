//! Liquidity taking strategy
//!
//! Watches trade prints. When a print consumes a large fraction of the
//! depth it hit (the feature engine's aggressive-trade ratio at or
//! above the configured threshold), the taker joins the move: a buy
//! print lifts the ask, a sell print hits the bid, one side at a time.

use market_data::Bbo;
use tracing::{debug, trace};
use types::config::TickerConfig;
use types::ids::TickerId;
use types::messages::MarketUpdate;
use types::numeric::Price;
use types::side::Side;
use types::MAX_TICKERS;

use crate::feature::FeatureEngine;
use crate::order_manager::{OmContext, OrderManager};

pub struct LiquidityTaker {
    ticker_cfg: Vec<TickerConfig>,
}

impl LiquidityTaker {
    pub fn new(ticker_cfg: &[TickerConfig]) -> Self {
        let mut ticker_cfg = ticker_cfg.to_vec();
        ticker_cfg.resize(MAX_TICKERS, TickerConfig::default());
        Self { ticker_cfg }
    }

    /// Book updates carry no signal for the taker.
    pub fn on_book_update(&mut self, ticker_id: TickerId, _bbo: &Bbo) {
        trace!(ticker = %ticker_id, "book update observed");
    }

    /// React to a strong print by taking the touch on its side.
    pub fn on_trade_update(
        &mut self,
        update: &MarketUpdate,
        bbo: &Bbo,
        features: &FeatureEngine,
        om: &mut OrderManager,
        ctx: &mut OmContext<'_>,
    ) {
        let Some(ratio) = features.agg_trade_qty_ratio() else {
            return;
        };
        if !bbo.is_two_sided() {
            return;
        }

        let cfg = &self.ticker_cfg[update.ticker_id.index()];
        if ratio < cfg.threshold {
            return;
        }

        debug!(
            ticker = %update.ticker_id,
            side = %update.side,
            %ratio,
            "aggressive print; taking the touch"
        );
        match update.side {
            Side::Buy => om.move_orders(
                update.ticker_id,
                bbo.ask_price,
                Price::INVALID,
                cfg.clip,
                ctx,
            ),
            Side::Sell => om.move_orders(
                update.ticker_id,
                Price::INVALID,
                bbo.bid_price,
                cfg.clip,
                ctx,
            ),
            Side::Invalid => {}
        }
    }
}
