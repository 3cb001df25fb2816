//! Snapshot synthesizer
//!
//! Maintains a shadow copy of every live order by applying the
//! sequenced incremental stream (ADD, MODIFY, CANCEL only; trades and
//! brackets carry no book state). The shadow tables are dense arrays
//! indexed by market order id. Every snapshot interval it publishes a
//! full cycle on the snapshot feed: a SNAPSHOT_START whose order-id
//! field carries the last applied incremental sequence number, then
//! per ticker a CLEAR followed by one ADD per live order in ascending
//! market-order-id (hence ascending priority within each price), then
//! a SNAPSHOT_END with the same anchor.
//!
//! The upstream is a single-producer ring, so a sequence gap here is a
//! bug, not a network event, and is fatal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use perf::Consumer;
use tracing::info;
use types::ids::TickerId;
use types::messages::{MarketUpdate, SequencedUpdate, UpdateKind};
use types::{MAX_ORDER_IDS, MAX_TICKERS};

use crate::publisher::UpdateSink;

/// How often a full snapshot cycle is published.
pub const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

struct TickerShadow {
    /// Live orders by market order id; the stored record is the ADD
    /// with its quantity kept current.
    orders: Vec<Option<MarketUpdate>>,
    live: usize,
}

impl TickerShadow {
    fn new() -> Self {
        Self {
            orders: vec![None; MAX_ORDER_IDS],
            live: 0,
        }
    }
}

/// The exchange's snapshot synthesizer thread.
pub struct SnapshotSynthesizer {
    inbound: Consumer<SequencedUpdate>,
    tickers: Vec<TickerShadow>,
    last_inc_seq_num: u64,
}

impl SnapshotSynthesizer {
    pub fn new(inbound: Consumer<SequencedUpdate>) -> Self {
        Self {
            inbound,
            tickers: (0..MAX_TICKERS).map(|_| TickerShadow::new()).collect(),
            last_inc_seq_num: 0,
        }
    }

    /// Apply one sequenced incremental packet to the shadow tables.
    pub fn apply(&mut self, packet: &SequencedUpdate) {
        assert_eq!(
            packet.seq_num,
            self.last_inc_seq_num + 1,
            "incremental gap inside the exchange: got {}, expected {}",
            packet.seq_num,
            self.last_inc_seq_num + 1
        );
        self.last_inc_seq_num = packet.seq_num;

        let update = &packet.update;
        match update.kind {
            UpdateKind::Add => {
                let shadow = &mut self.tickers[update.ticker_id.index()];
                let slot = &mut shadow.orders[update.order_id.index()];
                assert!(
                    slot.is_none(),
                    "ADD for already-present order {}",
                    update.order_id
                );
                *slot = Some(*update);
                shadow.live += 1;
            }
            UpdateKind::Modify => {
                let shadow = &mut self.tickers[update.ticker_id.index()];
                let order = shadow.orders[update.order_id.index()]
                    .as_mut()
                    .unwrap_or_else(|| panic!("MODIFY for unknown order {}", update.order_id));
                assert_eq!(order.side, update.side, "MODIFY side mismatch");
                order.qty = update.qty;
                order.price = update.price;
            }
            UpdateKind::Cancel => {
                let shadow = &mut self.tickers[update.ticker_id.index()];
                let slot = &mut shadow.orders[update.order_id.index()];
                let order = (*slot)
                    .unwrap_or_else(|| panic!("CANCEL for unknown order {}", update.order_id));
                assert_eq!(order.side, update.side, "CANCEL side mismatch");
                *slot = None;
                shadow.live -= 1;
            }
            UpdateKind::Trade
            | UpdateKind::Clear
            | UpdateKind::SnapshotStart
            | UpdateKind::SnapshotEnd
            | UpdateKind::Invalid => {}
        }
    }

    /// Drain every pending packet from the publisher's ring.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(packet) = self.inbound.try_pop() {
            self.apply(&packet);
            applied += 1;
        }
        applied
    }

    /// Publish one full snapshot cycle, sequenced from 0.
    pub fn publish_snapshot(&self, sink: &mut impl UpdateSink) {
        let mut seq_num = 0u64;
        let mut send = |sink: &mut dyn UpdateSink, update: MarketUpdate| {
            sink.publish(&SequencedUpdate { seq_num, update });
            seq_num += 1;
        };

        send(
            sink,
            MarketUpdate::snapshot_bracket(UpdateKind::SnapshotStart, self.last_inc_seq_num),
        );

        let mut order_count = 0usize;
        for (ticker, shadow) in self.tickers.iter().enumerate() {
            send(sink, MarketUpdate::clear(TickerId::new(ticker as u32)));
            for order in shadow.orders.iter().flatten() {
                send(sink, *order);
                order_count += 1;
            }
        }

        send(
            sink,
            MarketUpdate::snapshot_bracket(UpdateKind::SnapshotEnd, self.last_inc_seq_num),
        );

        info!(
            anchor = self.last_inc_seq_num,
            orders = order_count,
            packets = seq_num,
            "snapshot cycle published"
        );
    }

    /// Thread body: apply incrementals continuously, publishing a
    /// cycle every `SNAPSHOT_INTERVAL`. After the run flag clears the
    /// backlog is still applied, so the shadow tables end in step
    /// with everything the publisher emitted.
    pub fn run(&mut self, run: &AtomicBool, sink: &mut impl UpdateSink) {
        info!("snapshot synthesizer running");
        let mut last_snapshot = Instant::now();
        while run.load(Ordering::Acquire) {
            if self.poll() == 0 {
                std::hint::spin_loop();
            }
            if last_snapshot.elapsed() >= SNAPSHOT_INTERVAL {
                last_snapshot = Instant::now();
                self.publish_snapshot(sink);
            }
        }
        while self.poll() > 0 {}
        info!("snapshot synthesizer stopped");
    }

    /// Last incremental sequence number applied (the anchor of the
    /// next cycle).
    pub fn last_inc_seq_num(&self) -> u64 {
        self.last_inc_seq_num
    }

    /// Number of live orders in one ticker's shadow table.
    pub fn live_orders(&self, ticker_id: TickerId) -> usize {
        self.tickers[ticker_id.index()].live
    }
}
