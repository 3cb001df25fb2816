//! Order server
//!
//! The exchange side of the order-entry protocol. Accepts TCP
//! connections without blocking, reassembles sequenced requests,
//! validates each connection's strictly incrementing inbound sequence
//! and stable client id, and forwards the requests into the matching
//! engine's ring. Responses coming back from the engine are routed to
//! the owning client's connection and framed with that connection's
//! own outbound sequence.
//!
//! A connection that violates the protocol (sequence gap, changing
//! client id, undecodable frame) is dropped; the books it left behind
//! are untouched, exactly as if the client had gone silent.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use perf::{Consumer, Producer};
use tracing::{error, info, warn};
use types::ids::ClientId;
use types::messages::{ClientRequest, ClientResponse, SequencedRequest, SequencedResponse};
use types::wire::WireRecord;

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Bound by the first request on the connection.
    client_id: Option<ClientId>,
    next_expected_seq_num: u64,
    next_outgoing_seq_num: u64,
    rx_buf: Vec<u8>,
    tx_buf: Vec<u8>,
    dead: bool,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            client_id: None,
            next_expected_seq_num: 1,
            next_outgoing_seq_num: 1,
            rx_buf: Vec::new(),
            tx_buf: Vec::new(),
            dead: false,
        }
    }
}

pub struct OrderServer {
    listener: TcpListener,
    requests: Producer<ClientRequest>,
    responses: Consumer<ClientResponse>,
    connections: Vec<Option<Connection>>,
    client_slots: HashMap<ClientId, usize>,
}

impl OrderServer {
    pub fn bind(
        addr: SocketAddr,
        requests: Producer<ClientRequest>,
        responses: Consumer<ClientResponse>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        info!(%addr, "order server listening");
        Ok(Self {
            listener,
            requests,
            responses,
            connections: Vec::new(),
            client_slots: HashMap::new(),
        })
    }

    /// Thread body. After the run flag clears, the server keeps
    /// polling until nothing moves: requests already received reach
    /// the engine and queued responses reach their clients before the
    /// listener goes away.
    pub fn run(&mut self, run: &AtomicBool) {
        info!("order server running");
        while run.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        while self.poll() > 0 {}
        info!("order server stopped");
    }

    /// One accept/read/route/write pass; returns records moved.
    pub fn poll(&mut self) -> usize {
        self.accept_new();
        let mut moved = self.read_requests();
        moved += self.route_responses();
        for slot in self.connections.iter_mut().flatten() {
            Self::flush(slot);
        }
        self.reap_dead();
        moved
    }

    fn accept_new(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if stream.set_nonblocking(true).and_then(|_| stream.set_nodelay(true)).is_err()
                    {
                        warn!(%peer, "could not configure accepted socket; dropping");
                        continue;
                    }
                    info!(%peer, "client connected");
                    let connection = Connection::new(stream, peer);
                    match self.connections.iter_mut().position(|c| c.is_none()) {
                        Some(slot) => self.connections[slot] = Some(connection),
                        None => self.connections.push(Some(connection)),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    fn read_requests(&mut self) -> usize {
        let mut forwarded = 0;
        for slot_index in 0..self.connections.len() {
            let Some(connection) = self.connections[slot_index].as_mut() else {
                continue;
            };
            if connection.dead {
                continue;
            }

            let mut chunk = [0u8; 4096];
            loop {
                match connection.stream.read(&mut chunk) {
                    Ok(0) => {
                        info!(peer = %connection.peer, "client disconnected");
                        connection.dead = true;
                        break;
                    }
                    Ok(n) => connection.rx_buf.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!(peer = %connection.peer, error = %e, "read failed");
                        connection.dead = true;
                        break;
                    }
                }
            }

            let mut consumed = 0;
            while !connection.dead
                && connection.rx_buf.len() - consumed >= SequencedRequest::WIRE_LEN
            {
                let frame = &connection.rx_buf[consumed..consumed + SequencedRequest::WIRE_LEN];
                consumed += SequencedRequest::WIRE_LEN;

                let packet = match SequencedRequest::decode_from(frame) {
                    Ok(packet) => packet,
                    Err(e) => {
                        error!(peer = %connection.peer, error = %e, "undecodable request; dropping connection");
                        connection.dead = true;
                        break;
                    }
                };

                if packet.seq_num != connection.next_expected_seq_num {
                    error!(
                        peer = %connection.peer,
                        expected = connection.next_expected_seq_num,
                        received = packet.seq_num,
                        "request sequence violation; dropping connection"
                    );
                    connection.dead = true;
                    break;
                }
                connection.next_expected_seq_num += 1;

                let client_id = packet.request.client_id;
                match connection.client_id {
                    None => {
                        if self.client_slots.contains_key(&client_id) {
                            error!(peer = %connection.peer, client = %client_id, "client id already connected; dropping connection");
                            connection.dead = true;
                            break;
                        }
                        connection.client_id = Some(client_id);
                        self.client_slots.insert(client_id, slot_index);
                        info!(peer = %connection.peer, client = %client_id, "client id bound");
                    }
                    Some(bound) if bound != client_id => {
                        error!(
                            peer = %connection.peer,
                            bound = %bound,
                            received = %client_id,
                            "client id changed mid-connection; dropping connection"
                        );
                        connection.dead = true;
                        break;
                    }
                    Some(_) => {}
                }

                self.requests.push_spin(packet.request);
                forwarded += 1;
            }
            connection.rx_buf.drain(..consumed);
        }
        forwarded
    }

    fn route_responses(&mut self) -> usize {
        let mut routed = 0;
        while let Some(response) = self.responses.try_pop() {
            let Some(&slot_index) = self.client_slots.get(&response.client_id) else {
                warn!(client = %response.client_id, "response for unconnected client dropped");
                continue;
            };
            let Some(connection) = self.connections[slot_index].as_mut() else {
                continue;
            };

            let packet = SequencedResponse {
                seq_num: connection.next_outgoing_seq_num,
                response,
            };
            connection.next_outgoing_seq_num += 1;

            let start = connection.tx_buf.len();
            connection
                .tx_buf
                .resize(start + SequencedResponse::WIRE_LEN, 0);
            packet.encode_to(&mut connection.tx_buf[start..]);
            routed += 1;
        }
        routed
    }

    fn flush(connection: &mut Connection) {
        while !connection.tx_buf.is_empty() && !connection.dead {
            match connection.stream.write(&connection.tx_buf) {
                Ok(0) => return,
                Ok(written) => {
                    connection.tx_buf.drain(..written);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    error!(peer = %connection.peer, error = %e, "write failed");
                    connection.dead = true;
                }
            }
        }
    }

    fn reap_dead(&mut self) {
        for slot in self.connections.iter_mut() {
            if slot.as_ref().is_some_and(|c| c.dead) {
                let connection = slot.take().unwrap();
                if let Some(client_id) = connection.client_id {
                    self.client_slots.remove(&client_id);
                }
                info!(peer = %connection.peer, "connection reaped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use types::ids::{OrderId, TickerId};
    use types::messages::{RequestKind, ResponseKind};
    use types::numeric::{Price, Qty};
    use types::side::Side;

    fn request(client: u32, coid: u64) -> ClientRequest {
        ClientRequest {
            kind: RequestKind::New,
            client_id: ClientId::new(client),
            ticker_id: TickerId::new(0),
            order_id: OrderId::new(coid),
            side: Side::Buy,
            price: Price::new(100),
            qty: Qty::new(1),
        }
    }

    fn poll_until<F: FnMut() -> bool>(server: &mut OrderServer, mut done: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            server.poll();
        }
        assert!(done(), "condition not reached before deadline");
    }

    #[test]
    fn test_requests_forwarded_and_responses_routed() {
        let (req_tx, mut req_rx) = perf::ring(64);
        let (mut resp_tx, resp_rx) = perf::ring(64);
        let mut server =
            OrderServer::bind("127.0.0.1:0".parse().unwrap(), req_tx, resp_rx).unwrap();
        let addr = server.listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client.set_nodelay(true).unwrap();

        // Two sequenced requests from client 3.
        client
            .write_all(
                &SequencedRequest {
                    seq_num: 1,
                    request: request(3, 11),
                }
                .encode(),
            )
            .unwrap();
        client
            .write_all(
                &SequencedRequest {
                    seq_num: 2,
                    request: request(3, 12),
                }
                .encode(),
            )
            .unwrap();

        let mut received = Vec::new();
        poll_until(&mut server, || {
            while let Some(r) = req_rx.try_pop() {
                received.push(r);
            }
            received.len() == 2
        });
        assert_eq!(received[0].order_id, OrderId::new(11));
        assert_eq!(received[1].order_id, OrderId::new(12));

        // A response for client 3 goes back with outbound seq 1.
        resp_tx
            .try_push(ClientResponse {
                kind: ResponseKind::Accepted,
                client_id: ClientId::new(3),
                ticker_id: TickerId::new(0),
                client_order_id: OrderId::new(11),
                market_order_id: OrderId::new(1),
                side: Side::Buy,
                price: Price::new(100),
                exec_qty: Qty::ZERO,
                leaves_qty: Qty::new(1),
            })
            .unwrap();

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut frame = [0u8; SequencedResponse::WIRE_LEN];
        let mut read = 0;
        let deadline = Instant::now() + Duration::from_secs(5);
        client.set_nonblocking(true).unwrap();
        while read < frame.len() && Instant::now() < deadline {
            server.poll();
            match client.read(&mut frame[read..]) {
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => panic!("client read failed: {e}"),
            }
        }
        assert_eq!(read, frame.len());

        let packet = SequencedResponse::decode_from(&frame).unwrap();
        assert_eq!(packet.seq_num, 1);
        assert_eq!(packet.response.client_order_id, OrderId::new(11));
    }

    #[test]
    fn test_run_drains_queued_responses_after_stop() {
        let (req_tx, mut req_rx) = perf::ring(64);
        let (mut resp_tx, resp_rx) = perf::ring(64);
        let mut server =
            OrderServer::bind("127.0.0.1:0".parse().unwrap(), req_tx, resp_rx).unwrap();
        let addr = server.listener.local_addr().unwrap();

        // Bind client 3's connection with one request.
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(
                &SequencedRequest {
                    seq_num: 1,
                    request: request(3, 11),
                }
                .encode(),
            )
            .unwrap();
        poll_until(&mut server, || req_rx.try_pop().is_some());

        // A response is still queued when the stop lands; the drain
        // in run() must route and flush it before returning.
        resp_tx
            .try_push(ClientResponse {
                kind: ResponseKind::Accepted,
                client_id: ClientId::new(3),
                ticker_id: TickerId::new(0),
                client_order_id: OrderId::new(11),
                market_order_id: OrderId::new(1),
                side: Side::Buy,
                price: Price::new(100),
                exec_qty: Qty::ZERO,
                leaves_qty: Qty::new(1),
            })
            .unwrap();
        server.run(&AtomicBool::new(false));

        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut frame = [0u8; SequencedResponse::WIRE_LEN];
        client.read_exact(&mut frame).unwrap();
        let packet = SequencedResponse::decode_from(&frame).unwrap();
        assert_eq!(packet.seq_num, 1);
        assert_eq!(packet.response.client_order_id, OrderId::new(11));
    }

    #[test]
    fn test_sequence_violation_drops_connection() {
        let (req_tx, mut req_rx) = perf::ring(64);
        let (_resp_tx, resp_rx) = perf::ring::<ClientResponse>(64);
        let mut server =
            OrderServer::bind("127.0.0.1:0".parse().unwrap(), req_tx, resp_rx).unwrap();
        let addr = server.listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        // First frame must carry seq 1; send 5 instead.
        client
            .write_all(
                &SequencedRequest {
                    seq_num: 5,
                    request: request(3, 11),
                }
                .encode(),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(500);
        while Instant::now() < deadline {
            server.poll();
        }
        assert!(req_rx.try_pop().is_none());
        assert!(server.client_slots.is_empty());
    }
}
