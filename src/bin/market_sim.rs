//! Market Simulation Driver
//!
//! Feeds the matching engine with a random order stream, runs the single
//! consumer thread, and logs book state while the simulation runs. Press
//! Enter to stop; per-order latencies are written to `latencies.csv` on the
//! way out.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use matchbook_engine::metrics::MetricsReporter;
use matchbook_engine::utils::{format_price, LatencyTimer};
use matchbook_engine::{
    EngineMetrics, Order, OrderBook, OrderQueue, Side, DEFAULT_DEPTH,
};

/// Simulation knobs, read from the environment with sensible defaults.
#[derive(Debug, Clone)]
struct SimConfig {
    producers: usize,
    order_interval_ms: u64,
    min_price: u64,
    max_price: u64,
    max_quantity: u64,
}

impl SimConfig {
    fn from_env() -> Self {
        Self {
            producers: env_u64("SIM_PRODUCERS", 1) as usize,
            order_interval_ms: env_u64("SIM_ORDER_INTERVAL_MS", 2),
            min_price: env_u64("SIM_MIN_PRICE_TICKS", 9800),
            max_price: env_u64("SIM_MAX_PRICE_TICKS", 10200),
            max_quantity: env_u64("SIM_MAX_QUANTITY", 100),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let config = SimConfig::from_env();
    info!(?config, "starting market simulation");

    if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new().install() {
        warn!("failed to install Prometheus exporter: {e}");
    }

    let book = Arc::new(OrderBook::new());
    let queue = Arc::new(OrderQueue::new());
    let metrics = Arc::new(EngineMetrics::new());
    let running = Arc::new(AtomicBool::new(true));
    let next_order_id = Arc::new(AtomicU64::new(1));

    let mut producers = Vec::new();
    for producer_id in 0..config.producers {
        let queue = Arc::clone(&queue);
        let running = Arc::clone(&running);
        let next_order_id = Arc::clone(&next_order_id);
        let config = config.clone();
        producers.push(
            thread::Builder::new()
                .name(format!("producer-{producer_id}"))
                .spawn(move || run_producer(&queue, &running, &next_order_id, &config))?,
        );
    }

    let consumer = {
        let queue = Arc::clone(&queue);
        let book = Arc::clone(&book);
        let metrics = Arc::clone(&metrics);
        thread::Builder::new()
            .name("engine".into())
            .spawn(move || run_engine(&queue, &book, &metrics))?
    };

    let observer = {
        let book = Arc::clone(&book);
        let metrics = Arc::clone(&metrics);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("observer".into())
            .spawn(move || run_observer(&book, &metrics, &running))?
    };

    let reporter = {
        let reporter = MetricsReporter::new(
            Arc::clone(&metrics),
            Duration::from_secs(5),
            Arc::clone(&running),
        );
        thread::Builder::new()
            .name("metrics-reporter".into())
            .spawn(move || reporter.run())?
    };

    info!("simulation running; press Enter to stop");
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    info!("shutting down");
    running.store(false, Ordering::Relaxed);

    // Producers quiesce before the queue closes, so the consumer drains
    // everything in flight
    for producer in producers {
        producer.join().map_err(|_| "producer thread panicked")?;
    }
    queue.stop();

    let latencies = consumer.join().map_err(|_| "engine thread panicked")?;
    observer.join().map_err(|_| "observer thread panicked")?;
    reporter.join().map_err(|_| "reporter thread panicked")?;

    let stats = book.stats();
    info!(
        "final book - resting: {} | levels: {}/{} | trades: {} | volume: {}",
        stats.resting_orders, stats.bid_levels, stats.ask_levels, stats.total_trades,
        stats.total_volume,
    );

    save_latencies(Path::new("latencies.csv"), &latencies)?;
    info!("simulation complete");
    Ok(())
}

/// Push random LIMIT/MARKET/STOP orders until the running flag drops.
fn run_producer(
    queue: &OrderQueue,
    running: &AtomicBool,
    next_order_id: &AtomicU64,
    config: &SimConfig,
) {
    let mut rng = rand::thread_rng();

    while running.load(Ordering::Relaxed) {
        let id = next_order_id.fetch_add(1, Ordering::Relaxed);
        let side = if rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };
        let price = rng.gen_range(config.min_price..=config.max_price);
        let quantity = rng.gen_range(1..=config.max_quantity);

        let order = match rng.gen_range(0..100) {
            0..=9 => Order::market(id, side, quantity),
            10..=14 => Order::stop(id, side, price, quantity),
            _ => Order::limit(id, side, price, quantity),
        };
        queue.push(order);

        thread::sleep(Duration::from_millis(config.order_interval_ms));
    }
}

/// Single consumer: pop, apply, time. Returns per-order latencies in
/// arrival order for the CSV log.
fn run_engine(queue: &OrderQueue, book: &OrderBook, metrics: &EngineMetrics) -> Vec<(u64, u64)> {
    let mut latencies = Vec::with_capacity(100_000);

    while let Some(order) = queue.pop() {
        let id = order.id;
        let timer = LatencyTimer::start();
        let result = book.add_order(order);
        let elapsed = timer.stop();

        metrics.record_add_order_latency(elapsed);
        match result {
            Ok(()) => metrics.record_order_processed(),
            Err(e) => {
                warn!(id, "order rejected: {e}");
                metrics.record_order_rejected();
            }
        }
        latencies.push((id, elapsed.as_micros() as u64));

        if latencies.len() % 1000 == 0 {
            info!("processed {} orders", latencies.len());
        }
    }

    latencies
}

/// Periodically log book state and feed the gauges.
fn run_observer(book: &OrderBook, metrics: &EngineMetrics, running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(500));

        let snapshot = book.snapshot(DEFAULT_DEPTH);
        let imbalance = book.imbalance();
        let stats = book.stats();

        metrics.set_pending_stops(stats.pending_stops);
        metrics.set_trades_executed(stats.total_trades);
        metrics.set_total_volume(stats.total_volume);
        metrics.set_imbalance(imbalance);

        let signal = if imbalance > 0.3 {
            "BULLISH"
        } else if imbalance < -0.3 {
            "BEARISH"
        } else {
            "NEUTRAL"
        };

        info!(
            "book - bid: {:?} ask: {:?} | imbalance: {:.3} ({}) | pending stops: {} | trades: {}",
            stats.best_bid.map(format_price),
            stats.best_ask.map(format_price),
            imbalance,
            signal,
            stats.pending_stops,
            stats.total_trades,
        );
        for level in snapshot.asks.iter().rev() {
            tracing::debug!("  ask {} x {}", format_price(level.price), level.quantity);
        }
        for level in &snapshot.bids {
            tracing::debug!("  bid {} x {}", format_price(level.price), level.quantity);
        }
    }
}

/// Write per-order latencies in consumer-arrival order.
fn save_latencies(path: &Path, latencies: &[(u64, u64)]) -> io::Result<()> {
    let mut out = String::with_capacity(latencies.len() * 16 + 32);
    out.push_str("Order_ID,Latency_Microseconds\n");
    for (id, micros) in latencies {
        out.push_str(&format!("{id},{micros}\n"));
    }
    std::fs::write(path, out)?;

    info!(
        "saved {} latency samples to {}",
        latencies.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_u64_default() {
        assert_eq!(env_u64("SIM_NONEXISTENT_KEY", 42), 42);
    }

    #[test]
    fn test_save_latencies_layout() {
        let dir = std::env::temp_dir().join("matchbook_sim_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("latencies.csv");

        save_latencies(&path, &[(1, 12), (2, 7)]).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "Order_ID,Latency_Microseconds\n1,12\n2,7\n");
    }
}
