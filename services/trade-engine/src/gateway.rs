//! Order gateway
//!
//! The client's order-entry connection. Drains the trade engine's
//! request ring, frames each request with a strictly incrementing
//! outbound sequence number, and writes it to the exchange over a
//! non-blocking TCP stream. Inbound bytes are reassembled into
//! sequenced responses, validated (our client id, contiguous sequence)
//! and forwarded into the response ring. TCP is reliable, so a
//! violation of either check means a broken exchange; the offending
//! record is logged and dropped, matching the server's treatment of a
//! misbehaving peer.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use perf::{Consumer, Producer};
use tracing::{debug, error, info};
use types::ids::ClientId;
use types::messages::{ClientRequest, ClientResponse, SequencedRequest, SequencedResponse};
use types::wire::WireRecord;

pub struct OrderGateway {
    client_id: ClientId,
    requests: Consumer<ClientRequest>,
    responses: Producer<ClientResponse>,
    stream: TcpStream,
    next_outgoing_seq_num: u64,
    next_expected_seq_num: u64,
    rx_buf: Vec<u8>,
    tx_buf: Vec<u8>,
}

impl OrderGateway {
    /// Connect to the exchange's order server.
    pub fn connect(
        client_id: ClientId,
        addr: SocketAddr,
        requests: Consumer<ClientRequest>,
        responses: Producer<ClientResponse>,
    ) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)?;
        info!(client = %client_id, %addr, "order gateway connected");

        Ok(Self {
            client_id,
            requests,
            responses,
            stream,
            next_outgoing_seq_num: 1,
            next_expected_seq_num: 1,
            rx_buf: Vec::new(),
            tx_buf: Vec::new(),
        })
    }

    /// Thread body.
    pub fn run(&mut self, run: &AtomicBool) {
        info!("order gateway running");
        while run.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        // Push out anything the engine handed us before the stop.
        self.send_pending();
        self.flush();
        info!("order gateway stopped");
    }

    /// One send/receive pass; returns how many records moved.
    pub fn poll(&mut self) -> usize {
        let mut moved = self.send_pending();
        self.flush();
        moved += self.receive();
        moved
    }

    /// Frame every queued request onto the transmit buffer.
    fn send_pending(&mut self) -> usize {
        let mut sent = 0;
        while let Some(request) = self.requests.try_pop() {
            let packet = SequencedRequest {
                seq_num: self.next_outgoing_seq_num,
                request,
            };
            self.next_outgoing_seq_num += 1;

            let start = self.tx_buf.len();
            self.tx_buf.resize(start + SequencedRequest::WIRE_LEN, 0);
            packet.encode_to(&mut self.tx_buf[start..]);
            debug!(seq = packet.seq_num, kind = ?request.kind, "request framed");
            sent += 1;
        }
        sent
    }

    /// Write as much of the transmit buffer as the socket accepts.
    fn flush(&mut self) {
        while !self.tx_buf.is_empty() {
            match self.stream.write(&self.tx_buf) {
                Ok(0) => return,
                Ok(written) => {
                    self.tx_buf.drain(..written);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    error!(error = %e, "order connection write failed");
                    return;
                }
            }
        }
    }

    /// Read available bytes and forward every complete, valid
    /// response.
    fn receive(&mut self) -> usize {
        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break, // peer closed; drain what we have
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(error = %e, "order connection read failed");
                    break;
                }
            }
        }

        let mut forwarded = 0;
        let mut consumed = 0;
        while self.rx_buf.len() - consumed >= SequencedResponse::WIRE_LEN {
            let frame = &self.rx_buf[consumed..consumed + SequencedResponse::WIRE_LEN];
            consumed += SequencedResponse::WIRE_LEN;

            let packet = match SequencedResponse::decode_from(frame) {
                Ok(packet) => packet,
                Err(e) => {
                    error!(error = %e, "undecodable response frame dropped");
                    continue;
                }
            };
            if packet.response.client_id != self.client_id {
                error!(
                    expected = %self.client_id,
                    received = %packet.response.client_id,
                    "response for a different client dropped"
                );
                continue;
            }
            if packet.seq_num != self.next_expected_seq_num {
                error!(
                    expected = self.next_expected_seq_num,
                    received = packet.seq_num,
                    "response sequence violation; frame dropped"
                );
                continue;
            }
            self.next_expected_seq_num += 1;
            self.responses.push_spin(packet.response);
            forwarded += 1;
        }
        self.rx_buf.drain(..consumed);
        forwarded
    }
}
