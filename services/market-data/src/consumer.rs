//! Client-side market data consumer
//!
//! Normal mode forwards incremental packets to the trade engine in
//! strict `seq_num + 1` order. A gap flips the consumer into recovery:
//! it joins the snapshot feed, buffers further incrementals keyed by
//! sequence number, and captures one complete snapshot cycle. When a
//! cycle closes whose buffered incrementals continue contiguously past
//! the cycle's anchor, the consumer replays the snapshot's CLEAR+ADD
//! records, then the buffered incrementals above the anchor, drops the
//! rest, leaves the snapshot feed and resumes normal mode. The trade
//! engine therefore always sees updates in effect order.
//!
//! A duplicate incremental sequence number can only come from a broken
//! feed and is fatal. A fresh gap discovered while catching up simply
//! waits for the next snapshot cycle, whose anchor will have advanced.

use std::collections::BTreeMap;

use perf::Producer;
use tracing::{debug, info, warn};
use types::messages::{MarketUpdate, SequencedUpdate, UpdateKind};

/// Whether the consumer is synchronized with the incremental feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerMode {
    Normal,
    Recovery,
}

/// The trading client's market data consumer.
pub struct MarketDataConsumer {
    output: Producer<MarketUpdate>,
    /// Next incremental sequence number we expect to apply.
    next_exp_seq_num: u64,
    mode: ConsumerMode,
    /// Incrementals buffered during recovery, keyed by sequence.
    pending: BTreeMap<u64, MarketUpdate>,
    /// The snapshot cycle being captured, keyed by snapshot sequence.
    snapshot: BTreeMap<u64, MarketUpdate>,
}

impl MarketDataConsumer {
    pub fn new(output: Producer<MarketUpdate>) -> Self {
        Self {
            output,
            next_exp_seq_num: 1,
            mode: ConsumerMode::Normal,
            pending: BTreeMap::new(),
            snapshot: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> ConsumerMode {
        self.mode
    }

    /// The socket loop joins the snapshot group exactly while this is
    /// true.
    pub fn needs_snapshot_feed(&self) -> bool {
        self.mode == ConsumerMode::Recovery
    }

    /// Handle one packet from the incremental feed.
    pub fn on_incremental(&mut self, packet: &SequencedUpdate) {
        match self.mode {
            ConsumerMode::Normal => {
                if packet.seq_num == self.next_exp_seq_num {
                    self.next_exp_seq_num += 1;
                    self.forward(packet.update);
                } else if packet.seq_num > self.next_exp_seq_num {
                    warn!(
                        expected = self.next_exp_seq_num,
                        received = packet.seq_num,
                        "incremental gap; entering snapshot recovery"
                    );
                    self.mode = ConsumerMode::Recovery;
                    self.snapshot.clear();
                    self.buffer_pending(packet);
                } else {
                    panic!(
                        "duplicate incremental seq_num {} (already applied through {})",
                        packet.seq_num,
                        self.next_exp_seq_num - 1
                    );
                }
            }
            ConsumerMode::Recovery => {
                if packet.seq_num < self.next_exp_seq_num {
                    panic!(
                        "duplicate incremental seq_num {} (already applied through {})",
                        packet.seq_num,
                        self.next_exp_seq_num - 1
                    );
                }
                self.buffer_pending(packet);
            }
        }
    }

    /// Handle one packet from the snapshot feed. Ignored outside
    /// recovery (the feed is not joined then anyway).
    pub fn on_snapshot(&mut self, packet: &SequencedUpdate) {
        if self.mode != ConsumerMode::Recovery {
            debug!(seq = packet.seq_num, "snapshot packet outside recovery ignored");
            return;
        }

        if packet.update.kind == UpdateKind::SnapshotStart {
            // A fresh cycle begins; drop any half-captured one.
            self.snapshot.clear();
        }
        self.snapshot.insert(packet.seq_num, packet.update);

        if packet.update.kind == UpdateKind::SnapshotEnd {
            self.try_resync();
        }
    }

    fn buffer_pending(&mut self, packet: &SequencedUpdate) {
        if self.pending.insert(packet.seq_num, packet.update).is_some() {
            panic!("duplicate incremental seq_num {} while buffering", packet.seq_num);
        }
    }

    /// Attempt to rebuild from the captured cycle plus the buffered
    /// incrementals. Stays in recovery when either is incomplete.
    fn try_resync(&mut self) {
        let Some((&first_seq, first)) = self.snapshot.first_key_value() else {
            return;
        };
        if first_seq != 0 || first.kind != UpdateKind::SnapshotStart {
            warn!("snapshot cycle missing its start; waiting for the next cycle");
            self.snapshot.clear();
            return;
        }
        let (&last_seq, last) = self.snapshot.last_key_value().unwrap();
        if last.kind != UpdateKind::SnapshotEnd {
            return;
        }
        if self.snapshot.len() as u64 != last_seq + 1 {
            warn!(
                have = self.snapshot.len(),
                expect = last_seq + 1,
                "snapshot cycle has holes; waiting for the next cycle"
            );
            self.snapshot.clear();
            return;
        }

        let anchor = first.order_id.value();
        assert_eq!(
            last.order_id.value(),
            anchor,
            "snapshot cycle brackets disagree on the anchor"
        );

        // The buffered incrementals must continue the stream
        // contiguously from just past the anchor.
        let mut expect = anchor + 1;
        let mut replay = Vec::new();
        for (&seq, update) in self.pending.range(anchor + 1..) {
            if seq != expect {
                break;
            }
            replay.push(*update);
            expect += 1;
        }
        if self
            .pending
            .keys()
            .next_back()
            .is_some_and(|&max| max >= expect)
        {
            warn!(
                anchor,
                resume_at = expect,
                "buffered incrementals have a hole; waiting for the next cycle"
            );
            self.snapshot.clear();
            return;
        }

        // Rebuild: the cycle's CLEAR+ADD records in snapshot order,
        // then the live stream from the anchor on.
        let records: Vec<MarketUpdate> = self
            .snapshot
            .values()
            .filter(|u| matches!(u.kind, UpdateKind::Clear | UpdateKind::Add))
            .copied()
            .collect();
        for update in records {
            self.forward(update);
        }
        let replay_len = replay.len();
        for update in replay {
            self.forward(update);
        }

        info!(
            anchor,
            replayed = replay_len,
            resumed_at = expect,
            "snapshot recovery complete"
        );
        self.pending.clear();
        self.snapshot.clear();
        self.next_exp_seq_num = expect;
        self.mode = ConsumerMode::Normal;
    }

    fn forward(&mut self, update: MarketUpdate) {
        self.output.push_spin(update);
    }
}
