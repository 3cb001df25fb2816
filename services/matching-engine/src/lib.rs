//! Matching Engine Service
//!
//! Continuous limit-order matching with strict price-time priority.
//! One book per ticker; the engine thread drains client requests from
//! its inbound ring and emits client responses and market updates on
//! its outbound rings.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced
//! - Deterministic matching (same inputs → same outputs)
//! - No crossed book after an add completes
//! - Market order ids and intra-price priorities strictly increasing

pub mod book;
pub mod engine;
pub mod events;

pub use book::OrderBook;
pub use engine::MatchingEngine;
pub use events::{Outbound, OutboundSink, RecordingSink};
