//! Position and PnL accounting
//!
//! One `PositionInfo` per ticker: signed position, per-side open
//! notional (a VWAP once divided by the absolute position), realized
//! and unrealized PnL, and cumulative volume. Fills move realized PnL
//! when they reduce or flip the position; BBO updates re-mark the
//! unrealized PnL from the mid price. All money values are `Decimal`
//! so the accounting is exact and host-independent.

use market_data::Bbo;
use rust_decimal::Decimal;
use tracing::debug;
use types::ids::TickerId;
use types::messages::ClientResponse;
use types::numeric::Qty;
use types::side::Side;
use types::MAX_TICKERS;

/// Position state for one ticker.
#[derive(Debug, Clone)]
pub struct PositionInfo {
    /// Signed position: positive long, negative short.
    pub position: i64,
    pub real_pnl: Decimal,
    pub unreal_pnl: Decimal,
    pub total_pnl: Decimal,
    /// Open notional per side; divide by |position| for the VWAP.
    open_vwap: [Decimal; 2],
    /// Cumulative traded volume.
    pub volume: Qty,
    /// Last BBO seen for this ticker.
    bbo: Bbo,
}

impl Default for PositionInfo {
    fn default() -> Self {
        Self {
            position: 0,
            real_pnl: Decimal::ZERO,
            unreal_pnl: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            open_vwap: [Decimal::ZERO; 2],
            volume: Qty::ZERO,
            bbo: Bbo::default(),
        }
    }
}

impl PositionInfo {
    /// Last BBO this ticker was marked against.
    pub fn last_bbo(&self) -> &Bbo {
        &self.bbo
    }

    /// Open VWAP for one side, or zero when flat.
    pub fn open_vwap(&self, side: Side) -> Decimal {
        if self.position == 0 {
            return Decimal::ZERO;
        }
        self.open_vwap[side.index()] / Decimal::from(self.position.abs())
    }

    /// Apply one fill: update position, volume, VWAPs and PnL.
    fn add_fill(&mut self, response: &ClientResponse) {
        let side = response.side;
        let side_index = side.index();
        let opp_index = side.opposite().index();
        let side_value = side.to_value();

        let old_position = self.position;
        let exec = response.exec_qty.value() as i64;
        self.position += exec * side_value;
        self.volume += response.exec_qty;

        let price = response.price.as_decimal();
        let exec_dec = response.exec_qty.as_decimal();

        if old_position * side_value >= 0 {
            // Opening or extending: accumulate this side's notional.
            self.open_vwap[side_index] += price * exec_dec;
        } else {
            // Reducing against the opposite side's VWAP.
            let opp_vwap = self.open_vwap[opp_index] / Decimal::from(old_position.abs());
            self.open_vwap[opp_index] = opp_vwap * Decimal::from(self.position.abs());
            let closed = exec.min(old_position.abs());
            self.real_pnl +=
                Decimal::from(closed) * (opp_vwap - price) * Decimal::from(side_value);
            if self.position * old_position < 0 {
                // Flipped through flat: the residual re-opens at the
                // fill price.
                self.open_vwap[side_index] = price * Decimal::from(self.position.abs());
                self.open_vwap[opp_index] = Decimal::ZERO;
            }
        }

        if self.position == 0 {
            self.open_vwap = [Decimal::ZERO; 2];
            self.unreal_pnl = Decimal::ZERO;
        } else {
            let abs = Decimal::from(self.position.abs());
            self.unreal_pnl = if self.position > 0 {
                (price - self.open_vwap[Side::Buy.index()] / abs) * abs
            } else {
                (self.open_vwap[Side::Sell.index()] / abs - price) * abs
            };
        }
        self.total_pnl = self.unreal_pnl + self.real_pnl;

        debug!(
            position = self.position,
            real = %self.real_pnl,
            unreal = %self.unreal_pnl,
            volume = %self.volume,
            "fill applied"
        );
    }

    /// Re-mark unrealized PnL from the mid when a position is open.
    fn update_bbo(&mut self, bbo: &Bbo) {
        self.bbo = *bbo;

        if self.position != 0 && bbo.is_two_sided() {
            let mid = (bbo.bid_price.as_decimal() + bbo.ask_price.as_decimal())
                / Decimal::from(2);
            let abs = Decimal::from(self.position.abs());
            self.unreal_pnl = if self.position > 0 {
                (mid - self.open_vwap[Side::Buy.index()] / abs) * abs
            } else {
                (self.open_vwap[Side::Sell.index()] / abs - mid) * abs
            };
            self.total_pnl = self.unreal_pnl + self.real_pnl;
        }
    }
}

/// Position accounting across every ticker.
#[derive(Debug)]
pub struct PositionKeeper {
    positions: Vec<PositionInfo>,
}

impl Default for PositionKeeper {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionKeeper {
    pub fn new() -> Self {
        Self {
            positions: vec![PositionInfo::default(); MAX_TICKERS],
        }
    }

    /// Apply one FILLED client response.
    pub fn add_fill(&mut self, response: &ClientResponse) {
        self.positions[response.ticker_id.index()].add_fill(response);
    }

    /// Apply a BBO change for one ticker.
    pub fn update_bbo(&mut self, ticker_id: TickerId, bbo: &Bbo) {
        self.positions[ticker_id.index()].update_bbo(bbo);
    }

    pub fn position(&self, ticker_id: TickerId) -> &PositionInfo {
        &self.positions[ticker_id.index()]
    }

    /// Total PnL and volume across every ticker (shutdown report).
    pub fn totals(&self) -> (Decimal, Qty) {
        let mut pnl = Decimal::ZERO;
        let mut volume = Qty::ZERO;
        for info in &self.positions {
            pnl += info.total_pnl;
            volume += info.volume;
        }
        (pnl, volume)
    }
}
