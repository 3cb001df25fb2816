//! UDP multicast plumbing for the market data feeds
//!
//! Thin non-blocking socket wrappers around the packed wire codec. The
//! protocol logic stays in the publisher/synthesizer/consumer types;
//! these adapters only move packets between rings and datagrams.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use tracing::{error, info, warn};
use types::messages::SequencedUpdate;
use types::wire::WireRecord;

use crate::publisher::UpdateSink;

/// Sender onto one multicast group.
pub struct UdpFeedSink {
    socket: UdpSocket,
    dest: SocketAddrV4,
}

impl UdpFeedSink {
    pub fn new(group: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_loop_v4(true)?;
        info!(%group, port, "multicast feed sender ready");
        Ok(Self {
            socket,
            dest: SocketAddrV4::new(group, port),
        })
    }
}

impl UpdateSink for UdpFeedSink {
    fn publish(&mut self, packet: &SequencedUpdate) {
        let mut buf = [0u8; SequencedUpdate::WIRE_LEN];
        packet.encode_to(&mut buf);
        loop {
            match self.socket.send_to(&buf, self.dest) {
                Ok(_) => return,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    std::hint::spin_loop();
                }
                Err(e) => {
                    error!(seq = packet.seq_num, error = %e, "feed send failed; packet lost");
                    return;
                }
            }
        }
    }
}

/// Receiver joined to one multicast group. Leaving the group is
/// dropping the receiver.
pub struct UdpFeedReceiver {
    socket: UdpSocket,
    group: Ipv4Addr,
}

impl UdpFeedReceiver {
    pub fn join(group: Ipv4Addr, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
        socket.set_nonblocking(true)?;
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        info!(%group, port, "joined multicast feed");
        Ok(Self { socket, group })
    }

    /// Pull one packet if a datagram is waiting. Malformed datagrams
    /// are logged and skipped.
    pub fn try_recv(&self) -> Option<SequencedUpdate> {
        let mut buf = [0u8; SequencedUpdate::WIRE_LEN];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _)) => match SequencedUpdate::decode_from(&buf[..len]) {
                Ok(packet) => Some(packet),
                Err(e) => {
                    warn!(len, error = %e, "dropping malformed feed datagram");
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
            Err(e) => {
                error!(error = %e, "feed receive failed");
                None
            }
        }
    }
}

impl Drop for UdpFeedReceiver {
    fn drop(&mut self) {
        if let Err(e) = self.socket.leave_multicast_v4(&self.group, &Ipv4Addr::UNSPECIFIED) {
            warn!(group = %self.group, error = %e, "leaving multicast group failed");
        }
    }
}
