//! Exchange binary
//!
//! No arguments; the interface, port and multicast groups are
//! compiled in. Four pinned threads, one ring between each pair,
//! every ring single-producer/single-consumer:
//!
//! order server → matching engine → order server (responses)
//!                       └→ market data publisher → incremental feed
//!                                 └→ snapshot synthesizer → snapshot feed
//!
//! SIGINT flips the shared run flag; each thread drains its inbound
//! ring before exiting, and components are dropped in reverse data
//! order.

mod order_server;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use market_data::net::UdpFeedSink;
use market_data::{MarketDataPublisher, SnapshotSynthesizer};
use matching_engine::MatchingEngine;
use order_server::OrderServer;
use types::MAX_PENDING_MESSAGES;

const ORDER_SERVER_ADDR: &str = "0.0.0.0:12345";
const SNAPSHOT_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(239, 255, 14, 1);
const SNAPSHOT_PORT: u16 = 20000;
const INCREMENTAL_GROUP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(239, 255, 14, 3);
const INCREMENTAL_PORT: u16 = 20001;

const MATCHING_ENGINE_CORE: usize = 0;
const MD_PUBLISHER_CORE: usize = 1;
const SNAPSHOT_SYNTHESIZER_CORE: usize = 2;
const ORDER_SERVER_CORE: usize = 3;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("starting exchange");

    let run = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    let (req_tx, req_rx) = perf::ring(MAX_PENDING_MESSAGES);
    let (resp_tx, resp_rx) = perf::ring(MAX_PENDING_MESSAGES);
    let (upd_tx, upd_rx) = perf::ring(MAX_PENDING_MESSAGES);
    let (snap_q_tx, snap_q_rx) = perf::ring(MAX_PENDING_MESSAGES);

    info!("starting matching engine");
    let matching_engine = {
        let run = Arc::clone(&run);
        thread::Builder::new()
            .name("matching-engine".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(MATCHING_ENGINE_CORE);
                let mut engine = MatchingEngine::new(req_rx, resp_tx, upd_tx, run);
                engine.run();
            })?
    };

    info!("starting market data publisher");
    let incremental_sink = UdpFeedSink::new(INCREMENTAL_GROUP, INCREMENTAL_PORT)
        .context("incremental feed socket")?;
    let md_publisher = {
        let run = Arc::clone(&run);
        thread::Builder::new()
            .name("md-publisher".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(MD_PUBLISHER_CORE);
                let mut publisher = MarketDataPublisher::new(upd_rx, snap_q_tx, incremental_sink);
                publisher.run(&run);
            })?
    };

    info!("starting snapshot synthesizer");
    let mut snapshot_sink =
        UdpFeedSink::new(SNAPSHOT_GROUP, SNAPSHOT_PORT).context("snapshot feed socket")?;
    let snapshot_synthesizer = {
        let run = Arc::clone(&run);
        thread::Builder::new()
            .name("snapshot-synthesizer".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(SNAPSHOT_SYNTHESIZER_CORE);
                let mut synthesizer = SnapshotSynthesizer::new(snap_q_rx);
                synthesizer.run(&run, &mut snapshot_sink);
            })?
    };

    info!("starting order server");
    let addr: SocketAddr = ORDER_SERVER_ADDR.parse().expect("static address");
    let order_server = {
        let run = Arc::clone(&run);
        thread::Builder::new()
            .name("order-server".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(ORDER_SERVER_CORE);
                match OrderServer::bind(addr, req_tx, resp_rx) {
                    Ok(mut server) => server.run(&run),
                    Err(e) => tracing::error!(error = %e, "order server could not bind"),
                }
            })?
    };

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    info!("SIGINT received; shutting down");
    run.store(false, Ordering::Release);
    order_server.join().expect("order server thread panicked");
    matching_engine.join().expect("matching engine thread panicked");
    md_publisher.join().expect("md publisher thread panicked");
    snapshot_synthesizer
        .join()
        .expect("snapshot synthesizer thread panicked");

    info!("exchange stopped");
    Ok(())
}
