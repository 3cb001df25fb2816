//! Outbound event plumbing for the matching book
//!
//! The book never stores a pointer back to its engine; every operation
//! receives a sink and emits through it. In production the sink writes
//! the outbound rings; tests record the combined stream to assert
//! emission ordering.

use types::messages::{ClientResponse, MarketUpdate};

/// Where the book sends client responses and market updates.
pub trait OutboundSink {
    fn on_response(&mut self, response: ClientResponse);
    fn on_update(&mut self, update: MarketUpdate);
}

/// One emitted record, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    Response(ClientResponse),
    Update(MarketUpdate),
}

/// Sink that records the combined emission stream.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<Outbound>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The responses in emission order.
    pub fn responses(&self) -> Vec<ClientResponse> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Outbound::Response(r) => Some(*r),
                Outbound::Update(_) => None,
            })
            .collect()
    }

    /// The market updates in emission order.
    pub fn updates(&self) -> Vec<MarketUpdate> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Outbound::Update(u) => Some(*u),
                Outbound::Response(_) => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl OutboundSink for RecordingSink {
    fn on_response(&mut self, response: ClientResponse) {
        self.events.push(Outbound::Response(response));
    }

    fn on_update(&mut self, update: MarketUpdate) {
        self.events.push(Outbound::Update(update));
    }
}
