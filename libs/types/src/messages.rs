//! Order-entry and market-data records
//!
//! These are the only payloads that cross thread and process
//! boundaries: client requests into the matching engine, client
//! responses back out, and market updates toward the data feeds. All
//! records are plain copyable data with no pointers into the
//! producer's memory.

use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, OrderId, TickerId};
use crate::numeric::{Price, Priority, Qty};
use crate::side::Side;

/// Kind of an order-entry request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum RequestKind {
    Invalid = 0,
    New = 1,
    Cancel = 2,
}

impl RequestKind {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(RequestKind::Invalid),
            1 => Some(RequestKind::New),
            2 => Some(RequestKind::Cancel),
            _ => None,
        }
    }
}

/// Kind of an order-entry response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ResponseKind {
    Invalid = 0,
    Accepted = 1,
    Canceled = 2,
    Filled = 3,
    CancelRejected = 4,
}

impl ResponseKind {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ResponseKind::Invalid),
            1 => Some(ResponseKind::Accepted),
            2 => Some(ResponseKind::Canceled),
            3 => Some(ResponseKind::Filled),
            4 => Some(ResponseKind::CancelRejected),
            _ => None,
        }
    }
}

/// Kind of a market-data update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum UpdateKind {
    Invalid = 0,
    /// Drop all book state for the ticker.
    Clear = 1,
    Add = 2,
    Modify = 3,
    Cancel = 4,
    Trade = 5,
    /// Snapshot cycle bracket; `order_id` carries the anchor
    /// incremental sequence number.
    SnapshotStart = 6,
    SnapshotEnd = 7,
}

impl UpdateKind {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(UpdateKind::Invalid),
            1 => Some(UpdateKind::Clear),
            2 => Some(UpdateKind::Add),
            3 => Some(UpdateKind::Modify),
            4 => Some(UpdateKind::Cancel),
            5 => Some(UpdateKind::Trade),
            6 => Some(UpdateKind::SnapshotStart),
            7 => Some(UpdateKind::SnapshotEnd),
            _ => None,
        }
    }

    /// Static label for structured log fields.
    pub fn label(self) -> &'static str {
        match self {
            UpdateKind::Invalid => "INVALID",
            UpdateKind::Clear => "CLEAR",
            UpdateKind::Add => "ADD",
            UpdateKind::Modify => "MODIFY",
            UpdateKind::Cancel => "CANCEL",
            UpdateKind::Trade => "TRADE",
            UpdateKind::SnapshotStart => "SNAPSHOT_START",
            UpdateKind::SnapshotEnd => "SNAPSHOT_END",
        }
    }
}

/// An order-entry request as sent by a trading client.
///
/// `order_id` is client-scoped: unique per client while the order is
/// live, reusable after the order is dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub kind: RequestKind,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    pub order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
}

impl Default for ClientRequest {
    fn default() -> Self {
        Self {
            kind: RequestKind::Invalid,
            client_id: ClientId::INVALID,
            ticker_id: TickerId::INVALID,
            order_id: OrderId::INVALID,
            side: Side::Invalid,
            price: Price::INVALID,
            qty: Qty::INVALID,
        }
    }
}

/// An order-entry response as sent by the matching engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientResponse {
    pub kind: ResponseKind,
    pub client_id: ClientId,
    pub ticker_id: TickerId,
    /// The id the client chose on its request.
    pub client_order_id: OrderId,
    /// The exchange-assigned id, unique per book.
    pub market_order_id: OrderId,
    pub side: Side,
    pub price: Price,
    pub exec_qty: Qty,
    pub leaves_qty: Qty,
}

impl Default for ClientResponse {
    fn default() -> Self {
        Self {
            kind: ResponseKind::Invalid,
            client_id: ClientId::INVALID,
            ticker_id: TickerId::INVALID,
            client_order_id: OrderId::INVALID,
            market_order_id: OrderId::INVALID,
            side: Side::Invalid,
            price: Price::INVALID,
            exec_qty: Qty::INVALID,
            leaves_qty: Qty::INVALID,
        }
    }
}

/// A market-data update as emitted by the matching engine and carried
/// on both the incremental and snapshot feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketUpdate {
    pub kind: UpdateKind,
    pub order_id: OrderId,
    pub ticker_id: TickerId,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub priority: Priority,
}

impl Default for MarketUpdate {
    fn default() -> Self {
        Self {
            kind: UpdateKind::Invalid,
            order_id: OrderId::INVALID,
            ticker_id: TickerId::INVALID,
            side: Side::Invalid,
            price: Price::INVALID,
            qty: Qty::INVALID,
            priority: Priority::INVALID,
        }
    }
}

impl MarketUpdate {
    /// A snapshot bracket record; the anchor incremental sequence
    /// number travels in the `order_id` field.
    pub fn snapshot_bracket(kind: UpdateKind, anchor_seq: u64) -> Self {
        debug_assert!(matches!(
            kind,
            UpdateKind::SnapshotStart | UpdateKind::SnapshotEnd
        ));
        Self {
            kind,
            order_id: OrderId::new(anchor_seq),
            ..Self::default()
        }
    }

    /// A clear directive for one ticker.
    pub fn clear(ticker_id: TickerId) -> Self {
        Self {
            kind: UpdateKind::Clear,
            ticker_id,
            ..Self::default()
        }
    }
}

/// A client request framed with its per-connection sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencedRequest {
    pub seq_num: u64,
    pub request: ClientRequest,
}

/// A client response framed with its per-connection sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencedResponse {
    pub seq_num: u64,
    pub response: ClientResponse,
}

/// A market update framed with its stream sequence number. Incremental
/// packets sequence from 1; snapshot packets restart from 0 per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SequencedUpdate {
    pub seq_num: u64,
    pub update: MarketUpdate,
}
