//! Feature engine
//!
//! Two signals derived from the reconstructed book, both `None` until
//! their inputs exist:
//!
//! - **fair price**: the qty-weighted mid
//!   `(bid_px × ask_qty + ask_px × bid_qty) / (bid_qty + ask_qty)`,
//!   refreshed on book updates;
//! - **aggressive trade qty ratio**: the size of the latest trade
//!   print relative to the depth it hit (ask depth for a buy print,
//!   bid depth for a sell), refreshed on trade updates.

use market_data::Bbo;
use rust_decimal::Decimal;
use tracing::trace;
use types::ids::TickerId;
use types::messages::MarketUpdate;
use types::side::Side;

#[derive(Debug, Default)]
pub struct FeatureEngine {
    market_price: Option<Decimal>,
    agg_trade_qty_ratio: Option<Decimal>,
}

impl FeatureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the fair price from a two-sided book.
    pub fn on_book_update(&mut self, ticker_id: TickerId, bbo: &Bbo) {
        if bbo.is_two_sided() && bbo.bid_qty.is_valid() && bbo.ask_qty.is_valid() {
            let bid_qty = bbo.bid_qty.as_decimal();
            let ask_qty = bbo.ask_qty.as_decimal();
            let depth = bid_qty + ask_qty;
            if depth > Decimal::ZERO {
                self.market_price = Some(
                    (bbo.bid_price.as_decimal() * ask_qty + bbo.ask_price.as_decimal() * bid_qty)
                        / depth,
                );
            }
        }
        trace!(ticker = %ticker_id, fair = ?self.market_price, "book feature updated");
    }

    /// Refresh the aggressive-trade ratio from a trade print.
    pub fn on_trade_update(&mut self, update: &MarketUpdate, bbo: &Bbo) {
        if bbo.is_two_sided() && bbo.bid_qty.is_valid() && bbo.ask_qty.is_valid() {
            let depth = match update.side {
                Side::Buy => bbo.ask_qty.as_decimal(),
                Side::Sell => bbo.bid_qty.as_decimal(),
                Side::Invalid => return,
            };
            if depth > Decimal::ZERO {
                self.agg_trade_qty_ratio = Some(update.qty.as_decimal() / depth);
            }
        }
        trace!(ratio = ?self.agg_trade_qty_ratio, "trade feature updated");
    }

    /// Fair market price, once a two-sided book has been seen.
    pub fn market_price(&self) -> Option<Decimal> {
        self.market_price
    }

    /// Latest trade size over the depth it consumed.
    pub fn agg_trade_qty_ratio(&self) -> Option<Decimal> {
        self.agg_trade_qty_ratio
    }
}
