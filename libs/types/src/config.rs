//! Per-ticker strategy and risk configuration
//!
//! Parsed from the trading binary's command line, five values per
//! ticker in ticker-id order. Unconfigured tickers keep the zeroed
//! defaults, which reject every order at the pre-trade risk gate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::numeric::Qty;

/// Pre-trade risk limits for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Largest single order quantity allowed.
    pub max_order_size: Qty,
    /// Largest absolute signed position allowed after the order.
    pub max_position: i64,
    /// Floor on total PnL; quoting stops below it. Negative in
    /// practice (a loss limit).
    pub max_loss: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_order_size: Qty::ZERO,
            max_position: 0,
            max_loss: Decimal::ZERO,
        }
    }
}

/// Strategy parameters for one ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TickerConfig {
    /// Quantity used for each strategy order.
    pub clip: Qty,
    /// Signal threshold: fair-price distance for the market maker,
    /// aggressive-trade-qty ratio for the liquidity taker.
    pub threshold: Decimal,
    pub risk: RiskConfig,
}

/// Which trading algorithm a client runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlgoKind {
    Maker,
    Taker,
    Random,
}

impl AlgoKind {
    pub fn label(self) -> &'static str {
        match self {
            AlgoKind::Maker => "MAKER",
            AlgoKind::Taker => "TAKER",
            AlgoKind::Random => "RANDOM",
        }
    }
}

impl FromStr for AlgoKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAKER" => Ok(AlgoKind::Maker),
            "TAKER" => Ok(AlgoKind::Taker),
            "RANDOM" => Ok(AlgoKind::Random),
            other => Err(format!("unknown algo kind: {other}")),
        }
    }
}

impl std::fmt::Display for AlgoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
