//! Pre-trade risk gate
//!
//! Every prospective order is checked against the ticker's configured
//! limits before it may leave the order manager. Checks run in a fixed
//! order against the position keeper's live state; the first breach
//! wins. An unconfigured ticker has all-zero limits and rejects every
//! order.

use tracing::debug;
use types::config::TickerConfig;
use types::ids::TickerId;
use types::numeric::Qty;
use types::side::Side;
use types::MAX_TICKERS;

use crate::position::PositionKeeper;

/// Outcome of the pre-trade check. `Allowed` means every limit passed;
/// anything else names the first limit breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskCheckResult {
    Allowed,
    OrderTooLarge,
    PositionTooLarge,
    LossTooLarge,
}

impl RiskCheckResult {
    pub fn label(self) -> &'static str {
        match self {
            RiskCheckResult::Allowed => "ALLOWED",
            RiskCheckResult::OrderTooLarge => "ORDER_TOO_LARGE",
            RiskCheckResult::PositionTooLarge => "POSITION_TOO_LARGE",
            RiskCheckResult::LossTooLarge => "LOSS_TOO_LARGE",
        }
    }
}

impl std::fmt::Display for RiskCheckResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-ticker pre-trade limits.
pub struct RiskEngine {
    configs: Vec<TickerConfig>,
}

impl RiskEngine {
    /// Build from the client's ticker configuration, padded with
    /// reject-everything defaults for unconfigured tickers.
    pub fn new(ticker_cfg: &[TickerConfig]) -> Self {
        let mut configs = ticker_cfg.to_vec();
        configs.resize(MAX_TICKERS, TickerConfig::default());
        Self { configs }
    }

    /// Check one prospective order. Evaluated in order: order size,
    /// then projected position, then total PnL.
    pub fn check_pre_trade(
        &self,
        positions: &PositionKeeper,
        ticker_id: TickerId,
        side: Side,
        qty: Qty,
    ) -> RiskCheckResult {
        let cfg = &self.configs[ticker_id.index()].risk;
        let info = positions.position(ticker_id);

        let result = if qty > cfg.max_order_size {
            RiskCheckResult::OrderTooLarge
        } else if (info.position + side.to_value() * qty.value() as i64).abs() > cfg.max_position {
            RiskCheckResult::PositionTooLarge
        } else if info.total_pnl < cfg.max_loss {
            RiskCheckResult::LossTooLarge
        } else {
            RiskCheckResult::Allowed
        };

        if result != RiskCheckResult::Allowed {
            debug!(
                ticker = %ticker_id,
                %side,
                %qty,
                result = result.label(),
                "pre-trade check failed"
            );
        }
        result
    }
}
