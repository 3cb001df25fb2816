//! Market Data Service
//!
//! Both halves of the market-data path live here. On the exchange
//! side, the publisher sequences the matching engine's updates onto
//! the incremental feed and feeds the snapshot synthesizer, which
//! periodically emits a full-book snapshot cycle. On the client side,
//! the consumer enforces stream contiguity (recovering from gaps via
//! the snapshot feed) and the market order book rebuilds per-ticker
//! depth with a cached best bid and offer.

pub mod consumer;
pub mod net;
pub mod order_book;
pub mod publisher;
pub mod synthesizer;

pub use consumer::MarketDataConsumer;
pub use order_book::{Bbo, BookNotice, MarketOrderBook};
pub use publisher::{MarketDataPublisher, UpdateSink};
pub use synthesizer::SnapshotSynthesizer;
