//! Trading client binary
//!
//! `trading <client_id> <MAKER|TAKER|RANDOM> [clip threshold
//! max_order_size max_position max_loss]...`, with five values per
//! ticker in ticker-id order.
//!
//! Three pinned threads mirror the exchange layout: the trade engine
//! dispatcher, the TCP order gateway, and the multicast market data
//! consumer. The RANDOM algorithm drives the exchange with seeded
//! random flow from this thread (it owns the request ring's producer
//! in that mode). The process stops after a minute of silence or on
//! SIGINT, draining the in-flight rings first.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, ensure, Context};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use tracing::{error, info};

use market_data::net::UdpFeedReceiver;
use market_data::MarketDataConsumer;
use perf::Producer;
use trade_engine::{ActivityTracker, OrderGateway, TradeEngine};
use types::config::{AlgoKind, RiskConfig, TickerConfig};
use types::ids::{ClientId, OrderId, TickerId};
use types::messages::{ClientRequest, RequestKind};
use types::numeric::{Price, Qty};
use types::side::Side;
use types::{MAX_PENDING_MESSAGES, MAX_TICKERS};

const ORDER_GATEWAY_ADDR: &str = "127.0.0.1:12345";
const SNAPSHOT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 14, 1);
const SNAPSHOT_PORT: u16 = 20000;
const INCREMENTAL_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 14, 3);
const INCREMENTAL_PORT: u16 = 20001;

const TRADE_ENGINE_CORE: usize = 0;
const ORDER_GATEWAY_CORE: usize = 1;
const MD_CONSUMER_CORE: usize = 2;

/// Seconds of feed/response silence after which the client exits.
const SILENT_SHUTDOWN_SECS: u64 = 60;
/// Startup grace before the random flow begins.
const WARMUP: Duration = Duration::from_secs(10);
/// Random flow shape.
const RANDOM_ORDERS: usize = 10_000;
const RANDOM_PAUSE: Duration = Duration::from_millis(20);

fn parse_args() -> anyhow::Result<(ClientId, AlgoKind, Vec<TickerConfig>)> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || (args.len() - 3) % 5 != 0 {
        bail!(
            "usage: trading <client_id> <MAKER|TAKER|RANDOM> \
             [clip threshold max_order_size max_position max_loss]..."
        );
    }

    let client_id = ClientId::new(args[1].parse().context("client_id")?);
    let algo = AlgoKind::from_str(&args[2]).map_err(anyhow::Error::msg)?;

    let mut ticker_cfg = Vec::new();
    for chunk in args[3..].chunks(5) {
        ticker_cfg.push(TickerConfig {
            clip: Qty::new(chunk[0].parse().context("clip")?),
            threshold: Decimal::from_str(&chunk[1]).context("threshold")?,
            risk: RiskConfig {
                max_order_size: Qty::new(chunk[2].parse().context("max_order_size")?),
                max_position: chunk[3].parse().context("max_position")?,
                max_loss: Decimal::from_str(&chunk[4]).context("max_loss")?,
            },
        });
    }
    ensure!(
        ticker_cfg.len() <= MAX_TICKERS,
        "at most {MAX_TICKERS} ticker configurations"
    );

    Ok((client_id, algo, ticker_cfg))
}

/// Seeded random order flow: alternately submit a fresh order and
/// cancel a randomly chosen earlier one, pausing between operations.
fn run_random_flow(
    client_id: ClientId,
    requests: &mut Producer<ClientRequest>,
    tracker: &ActivityTracker,
    shutdown: &AtomicBool,
) {
    let mut rng = ChaCha8Rng::seed_from_u64(client_id.value() as u64);
    let base_price: Vec<i64> = (0..MAX_TICKERS)
        .map(|_| rng.gen_range(100..200))
        .collect();

    let mut next_order_id = client_id.value() as u64 * 1000;
    let mut sent: Vec<ClientRequest> = Vec::new();

    for _ in 0..RANDOM_ORDERS {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let ticker_id = TickerId::new(rng.gen_range(0..MAX_TICKERS as u32));
        let price = Price::new(base_price[ticker_id.index()] + rng.gen_range(1..=10));
        let qty = Qty::new(rng.gen_range(2..=101));
        let side = if rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };

        let new_request = ClientRequest {
            kind: RequestKind::New,
            client_id,
            ticker_id,
            order_id: OrderId::new(next_order_id),
            side,
            price,
            qty,
        };
        next_order_id += 1;
        requests.push_spin(new_request);
        sent.push(new_request);
        thread::sleep(RANDOM_PAUSE);

        let mut cancel_request = sent[rng.gen_range(0..sent.len())];
        cancel_request.kind = RequestKind::Cancel;
        requests.push_spin(cancel_request);
        thread::sleep(RANDOM_PAUSE);

        if tracker.silent_seconds() >= SILENT_SHUTDOWN_SECS {
            info!("random flow stopping early: no responses coming back");
            break;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let (client_id, algo, ticker_cfg) = parse_args()?;
    info!(client = %client_id, %algo, tickers = ticker_cfg.len(), "starting trading client");

    let run = Arc::new(AtomicBool::new(true));
    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;

    let (req_tx, req_rx) = perf::ring::<ClientRequest>(MAX_PENDING_MESSAGES);
    let (resp_tx, resp_rx) = perf::ring(MAX_PENDING_MESSAGES);
    let (upd_tx, upd_rx) = perf::ring(MAX_PENDING_MESSAGES);
    let tracker = Arc::new(ActivityTracker::new());

    // The request ring's single producer lives with whoever sends:
    // the engine's order manager for strategies, this thread for the
    // random flow.
    let (engine_req_tx, local_req_tx) = match algo {
        AlgoKind::Random => (None, Some(req_tx)),
        AlgoKind::Maker | AlgoKind::Taker => (Some(req_tx), None),
    };

    info!("starting trade engine");
    let trade_engine = {
        let run = Arc::clone(&run);
        let tracker = Arc::clone(&tracker);
        let ticker_cfg = ticker_cfg.clone();
        thread::Builder::new()
            .name("trade-engine".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(TRADE_ENGINE_CORE);
                let mut engine = TradeEngine::new(
                    client_id,
                    algo,
                    &ticker_cfg,
                    engine_req_tx,
                    resp_rx,
                    upd_rx,
                    run,
                    tracker,
                );
                engine.run();
            })?
    };

    info!("starting order gateway");
    let order_gateway = {
        let run = Arc::clone(&run);
        let addr: SocketAddr = ORDER_GATEWAY_ADDR.parse().expect("static address");
        thread::Builder::new()
            .name("order-gateway".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(ORDER_GATEWAY_CORE);
                match OrderGateway::connect(client_id, addr, req_rx, resp_tx) {
                    Ok(mut gateway) => gateway.run(&run),
                    Err(e) => error!(error = %e, "order gateway could not connect"),
                }
            })?
    };

    info!("starting market data consumer");
    let md_consumer = {
        let run = Arc::clone(&run);
        thread::Builder::new()
            .name("md-consumer".into())
            .spawn(move || {
                perf::affinity::pin_current_thread(MD_CONSUMER_CORE);
                let incremental = match UdpFeedReceiver::join(INCREMENTAL_GROUP, INCREMENTAL_PORT)
                {
                    Ok(receiver) => receiver,
                    Err(e) => {
                        error!(error = %e, "could not join the incremental feed");
                        return;
                    }
                };
                let mut consumer = MarketDataConsumer::new(upd_tx);
                let mut snapshot: Option<UdpFeedReceiver> = None;

                while run.load(Ordering::Acquire) {
                    let mut moved = false;
                    while let Some(packet) = incremental.try_recv() {
                        consumer.on_incremental(&packet);
                        moved = true;
                    }

                    if consumer.needs_snapshot_feed() {
                        if snapshot.is_none() {
                            match UdpFeedReceiver::join(SNAPSHOT_GROUP, SNAPSHOT_PORT) {
                                Ok(receiver) => snapshot = Some(receiver),
                                Err(e) => {
                                    error!(error = %e, "could not join the snapshot feed")
                                }
                            }
                        }
                        if let Some(receiver) = &snapshot {
                            while let Some(packet) = receiver.try_recv() {
                                consumer.on_snapshot(&packet);
                                moved = true;
                            }
                        }
                    } else if snapshot.is_some() {
                        // Recovered: leave the snapshot group.
                        snapshot = None;
                    }

                    if !moved {
                        std::hint::spin_loop();
                    }
                }
            })?
    };

    thread::sleep(WARMUP);
    tracker.touch();

    if let Some(mut requests) = local_req_tx {
        info!("starting random flow");
        run_random_flow(client_id, &mut requests, &tracker, &shutdown);
    }

    while tracker.silent_seconds() < SILENT_SHUTDOWN_SECS && !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_secs(1));
    }

    info!("shutting down");
    run.store(false, Ordering::Release);
    trade_engine.join().expect("trade engine thread panicked");
    order_gateway.join().expect("order gateway thread panicked");
    md_consumer.join().expect("md consumer thread panicked");

    Ok(())
}
