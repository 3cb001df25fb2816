//! Packed little-endian codec for the wire records
//!
//! Every record has a fixed byte length with no padding, so framing on
//! a byte stream is a length check followed by `decode_from`. Encoding
//! then decoding any record is a bit-exact identity; decode rejects
//! truncated buffers and unknown discriminants instead of guessing.

use thiserror::Error;

use crate::ids::{ClientId, OrderId, TickerId};
use crate::messages::{
    ClientRequest, ClientResponse, MarketUpdate, RequestKind, ResponseKind, SequencedRequest,
    SequencedResponse, SequencedUpdate, UpdateKind,
};
use crate::numeric::{Price, Priority, Qty};
use crate::side::Side;

/// Errors surfaced while decoding a wire buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated record: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    #[error("unknown {field} discriminant: {raw}")]
    UnknownDiscriminant { field: &'static str, raw: i16 },
}

/// A fixed-length record that can be packed onto the wire.
pub trait WireRecord: Sized {
    /// Exact encoded length in bytes.
    const WIRE_LEN: usize;

    /// Encode into `buf`, which must hold at least `WIRE_LEN` bytes.
    fn encode_to(&self, buf: &mut [u8]);

    /// Decode from the first `WIRE_LEN` bytes of `buf`.
    fn decode_from(buf: &[u8]) -> Result<Self, WireError>;

    /// Encode into a freshly allocated buffer (non-hot-path helper).
    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::WIRE_LEN];
        self.encode_to(&mut buf);
        buf
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    fn put_i8(&mut self, v: i8) {
        self.put_u8(v as u8);
    }

    fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }

    fn put_u64(&mut self, v: u64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }

    fn put_i64(&mut self, v: i64) {
        self.put_u64(v as u64);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], need: usize) -> Result<Self, WireError> {
        if buf.len() < need {
            return Err(WireError::Truncated {
                need,
                got: buf.len(),
            });
        }
        Ok(Self { buf, pos: 0 })
    }

    fn get_u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }

    fn get_i8(&mut self) -> i8 {
        self.get_u8() as i8
    }

    fn get_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }

    fn get_u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }

    fn get_i64(&mut self) -> i64 {
        self.get_u64() as i64
    }

    fn get_side(&mut self) -> Result<Side, WireError> {
        let raw = self.get_i8();
        Side::from_wire(raw).ok_or(WireError::UnknownDiscriminant {
            field: "side",
            raw: raw as i16,
        })
    }
}

impl WireRecord for ClientRequest {
    // kind(1) client(4) ticker(4) order(8) side(1) price(8) qty(8)
    const WIRE_LEN: usize = 34;

    fn encode_to(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u8(self.kind as u8);
        w.put_u32(self.client_id.value());
        w.put_u32(self.ticker_id.value());
        w.put_u64(self.order_id.value());
        w.put_i8(self.side.to_wire());
        w.put_i64(self.price.ticks());
        w.put_u64(self.qty.value());
    }

    fn decode_from(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::WIRE_LEN)?;
        let raw_kind = r.get_u8();
        let kind = RequestKind::from_wire(raw_kind).ok_or(WireError::UnknownDiscriminant {
            field: "request kind",
            raw: raw_kind as i16,
        })?;
        Ok(Self {
            kind,
            client_id: ClientId::new(r.get_u32()),
            ticker_id: TickerId::new(r.get_u32()),
            order_id: OrderId::new(r.get_u64()),
            side: r.get_side()?,
            price: Price::new(r.get_i64()),
            qty: Qty::new(r.get_u64()),
        })
    }
}

impl WireRecord for ClientResponse {
    // kind(1) client(4) ticker(4) coid(8) moid(8) side(1) price(8)
    // exec(8) leaves(8)
    const WIRE_LEN: usize = 50;

    fn encode_to(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u8(self.kind as u8);
        w.put_u32(self.client_id.value());
        w.put_u32(self.ticker_id.value());
        w.put_u64(self.client_order_id.value());
        w.put_u64(self.market_order_id.value());
        w.put_i8(self.side.to_wire());
        w.put_i64(self.price.ticks());
        w.put_u64(self.exec_qty.value());
        w.put_u64(self.leaves_qty.value());
    }

    fn decode_from(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::WIRE_LEN)?;
        let raw_kind = r.get_u8();
        let kind = ResponseKind::from_wire(raw_kind).ok_or(WireError::UnknownDiscriminant {
            field: "response kind",
            raw: raw_kind as i16,
        })?;
        Ok(Self {
            kind,
            client_id: ClientId::new(r.get_u32()),
            ticker_id: TickerId::new(r.get_u32()),
            client_order_id: OrderId::new(r.get_u64()),
            market_order_id: OrderId::new(r.get_u64()),
            side: r.get_side()?,
            price: Price::new(r.get_i64()),
            exec_qty: Qty::new(r.get_u64()),
            leaves_qty: Qty::new(r.get_u64()),
        })
    }
}

impl WireRecord for MarketUpdate {
    // kind(1) order(8) ticker(4) side(1) price(8) qty(8) priority(8)
    const WIRE_LEN: usize = 38;

    fn encode_to(&self, buf: &mut [u8]) {
        let mut w = Writer::new(buf);
        w.put_u8(self.kind as u8);
        w.put_u64(self.order_id.value());
        w.put_u32(self.ticker_id.value());
        w.put_i8(self.side.to_wire());
        w.put_i64(self.price.ticks());
        w.put_u64(self.qty.value());
        w.put_u64(self.priority.value());
    }

    fn decode_from(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf, Self::WIRE_LEN)?;
        let raw_kind = r.get_u8();
        let kind = UpdateKind::from_wire(raw_kind).ok_or(WireError::UnknownDiscriminant {
            field: "update kind",
            raw: raw_kind as i16,
        })?;
        Ok(Self {
            kind,
            order_id: OrderId::new(r.get_u64()),
            ticker_id: TickerId::new(r.get_u32()),
            side: r.get_side()?,
            price: Price::new(r.get_i64()),
            qty: Qty::new(r.get_u64()),
            priority: Priority::new(r.get_u64()),
        })
    }
}

macro_rules! sequenced_record {
    ($outer:ty, $inner:ty, $field:ident) => {
        impl WireRecord for $outer {
            const WIRE_LEN: usize = 8 + <$inner>::WIRE_LEN;

            fn encode_to(&self, buf: &mut [u8]) {
                buf[..8].copy_from_slice(&self.seq_num.to_le_bytes());
                self.$field.encode_to(&mut buf[8..]);
            }

            fn decode_from(buf: &[u8]) -> Result<Self, WireError> {
                if buf.len() < Self::WIRE_LEN {
                    return Err(WireError::Truncated {
                        need: Self::WIRE_LEN,
                        got: buf.len(),
                    });
                }
                let seq_num = u64::from_le_bytes(buf[..8].try_into().unwrap());
                let $field = <$inner>::decode_from(&buf[8..])?;
                Ok(Self { seq_num, $field })
            }
        }
    };
}

sequenced_record!(SequencedRequest, ClientRequest, request);
sequenced_record!(SequencedResponse, ClientResponse, response);
sequenced_record!(SequencedUpdate, MarketUpdate, update);
