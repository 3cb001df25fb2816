//! Trade Engine Service
//!
//! The trading client's single-threaded dispatcher and everything it
//! drives: per-ticker book reconstruction, the feature engine, the
//! position keeper and risk gate, the order manager, and one strategy
//! (market maker or liquidity taker). The order gateway carries the
//! sequenced order-entry stream to and from the exchange.

pub mod engine;
pub mod feature;
pub mod gateway;
pub mod order_manager;
pub mod strategy;

pub use engine::{ActivityTracker, TradeEngine};
pub use feature::FeatureEngine;
pub use gateway::OrderGateway;
pub use order_manager::{OmContext, OmOrder, OmOrderState, OrderManager};
pub use strategy::Strategy;
