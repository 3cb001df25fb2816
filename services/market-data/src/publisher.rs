//! Incremental feed publisher
//!
//! Drains the matching engine's market-update ring, stamps each update
//! with the next incremental sequence number (starting at 1), sends it
//! on the incremental feed, and forwards the identical packet into the
//! snapshot synthesizer's ring. The synthesizer therefore sees exactly
//! the sequence the wire saw, which is what anchors snapshot cycles to
//! the incremental stream.

use std::sync::atomic::{AtomicBool, Ordering};

use perf::{Consumer, Producer};
use tracing::{debug, info};
use types::messages::{MarketUpdate, SequencedUpdate};

/// Where sequenced packets leave the process (a multicast socket in
/// production, a vector in tests).
pub trait UpdateSink {
    fn publish(&mut self, packet: &SequencedUpdate);
}

impl UpdateSink for Vec<SequencedUpdate> {
    fn publish(&mut self, packet: &SequencedUpdate) {
        self.push(*packet);
    }
}

/// The exchange's market-data publisher thread.
pub struct MarketDataPublisher<S> {
    updates: Consumer<MarketUpdate>,
    snapshot_queue: Producer<SequencedUpdate>,
    sink: S,
    next_seq_num: u64,
}

impl<S: UpdateSink> MarketDataPublisher<S> {
    pub fn new(
        updates: Consumer<MarketUpdate>,
        snapshot_queue: Producer<SequencedUpdate>,
        sink: S,
    ) -> Self {
        Self {
            updates,
            snapshot_queue,
            sink,
            next_seq_num: 1,
        }
    }

    /// Drain and publish every pending update. Returns how many were
    /// published.
    pub fn poll(&mut self) -> usize {
        let mut published = 0;
        while let Some(update) = self.updates.try_pop() {
            let packet = SequencedUpdate {
                seq_num: self.next_seq_num,
                update,
            };
            debug!(seq = packet.seq_num, kind = update.kind.label(), "publishing");
            self.sink.publish(&packet);
            self.snapshot_queue.push_spin(packet);
            self.next_seq_num += 1;
            published += 1;
        }
        published
    }

    /// Thread body: publish until the run flag clears, then drain the
    /// backlog so no sequenced update is lost to shutdown.
    pub fn run(&mut self, run: &AtomicBool) {
        info!("market data publisher running");
        while run.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
        }
        while self.poll() > 0 {}
        info!(
            published = self.next_seq_num - 1,
            "market data publisher stopped"
        );
    }

    /// Sequence number the next update will carry.
    pub fn next_seq_num(&self) -> u64 {
        self.next_seq_num
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}
