//! Risk Engine
//!
//! The trading client's position accounting and pre-trade risk gate.
//! The position keeper tracks signed positions, side VWAPs and
//! realized/unrealized PnL per ticker from fill responses and BBO
//! marks; the risk engine checks every prospective order against the
//! per-ticker limits using that live state.

pub mod engine;
pub mod position;

pub use engine::{RiskCheckResult, RiskEngine};
pub use position::{PositionInfo, PositionKeeper};
