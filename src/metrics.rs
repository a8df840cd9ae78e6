use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the matching engine.
#[derive(Debug)]
pub struct EngineMetrics {
    add_order_latency: LatencyTracker,
    orders_processed: AtomicU64,
    orders_rejected: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        describe_counter!("matchbook_orders_total", "Orders consumed by the engine");
        describe_histogram!(
            "matchbook_add_order_duration_seconds",
            "Latency of add_order calls"
        );
        describe_gauge!("matchbook_pending_stops", "Parked, untriggered stop orders");
        describe_gauge!("matchbook_trades_total", "Trades executed by the book");
        describe_gauge!("matchbook_volume_total", "Total traded quantity");
        describe_gauge!("matchbook_imbalance", "Top-of-book depth imbalance");

        Self {
            add_order_latency: LatencyTracker::new("add_order"),
            orders_processed: AtomicU64::new(0),
            orders_rejected: AtomicU64::new(0),
        }
    }

    /// Time a single `add_order` call.
    pub fn time_add_order<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.add_order_latency.time(f)
    }

    /// Record an externally measured `add_order` latency.
    pub fn record_add_order_latency(&self, duration: Duration) {
        self.add_order_latency.record_latency(duration);
    }

    pub fn record_order_processed(&self) {
        self.orders_processed.fetch_add(1, Ordering::Relaxed);
        counter!("matchbook_orders_total", "outcome" => "accepted").increment(1);
    }

    pub fn record_order_rejected(&self) {
        self.orders_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("matchbook_orders_total", "outcome" => "rejected").increment(1);
    }

    // Gauges fed by the observer from book state
    pub fn set_pending_stops(&self, count: u64) {
        gauge!("matchbook_pending_stops").set(count as f64);
    }

    pub fn set_trades_executed(&self, count: u64) {
        gauge!("matchbook_trades_total").set(count as f64);
    }

    pub fn set_total_volume(&self, volume: u64) {
        gauge!("matchbook_volume_total").set(volume as f64);
    }

    pub fn set_imbalance(&self, imbalance: f64) {
        gauge!("matchbook_imbalance").set(imbalance);
    }

    pub fn orders_processed(&self) -> u64 {
        self.orders_processed.load(Ordering::Relaxed)
    }

    pub fn orders_rejected(&self) -> u64 {
        self.orders_rejected.load(Ordering::Relaxed)
    }

    pub fn latency_stats(&self) -> OperationLatencyStats {
        self.add_order_latency.stats()
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency tracker for a single operation.
#[derive(Debug)]
struct LatencyTracker {
    operation: &'static str,
    samples: AtomicU64,
    total_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl LatencyTracker {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = Instant::now();
        let result = f();
        self.record_latency(start.elapsed());
        result
    }

    fn record_latency(&self, duration: Duration) {
        let nanos = duration.as_nanos() as u64;

        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut current_min = self.min_nanos.load(Ordering::Relaxed);
        while nanos < current_min {
            match self.min_nanos.compare_exchange_weak(
                current_min,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_min) => current_min = new_min,
            }
        }

        let mut current_max = self.max_nanos.load(Ordering::Relaxed);
        while nanos > current_max {
            match self.max_nanos.compare_exchange_weak(
                current_max,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(new_max) => current_max = new_max,
            }
        }

        histogram!("matchbook_add_order_duration_seconds", "operation" => self.operation)
            .record(duration.as_secs_f64());
    }

    fn stats(&self) -> OperationLatencyStats {
        let samples = self.samples.load(Ordering::Relaxed);
        let total = self.total_nanos.load(Ordering::Relaxed);
        let min = self.min_nanos.load(Ordering::Relaxed);
        let max = self.max_nanos.load(Ordering::Relaxed);

        OperationLatencyStats {
            samples,
            avg_nanos: if samples > 0 { total / samples } else { 0 },
            min_nanos: if min == u64::MAX { 0 } else { min },
            max_nanos: max,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OperationLatencyStats {
    pub samples: u64,
    pub avg_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
}

impl OperationLatencyStats {
    pub fn avg_micros(&self) -> f64 {
        self.avg_nanos as f64 / 1_000.0
    }

    pub fn min_micros(&self) -> f64 {
        self.min_nanos as f64 / 1_000.0
    }

    pub fn max_micros(&self) -> f64 {
        self.max_nanos as f64 / 1_000.0
    }
}

/// Background reporter logging a periodic metrics summary.
pub struct MetricsReporter {
    metrics: Arc<EngineMetrics>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<EngineMetrics>, interval: Duration, running: Arc<AtomicBool>) -> Self {
        Self {
            metrics,
            interval,
            running,
        }
    }

    pub fn run(&self) {
        while self.running.load(Ordering::Relaxed) {
            thread::sleep(self.interval);

            let stats = self.metrics.latency_stats();
            info!(
                "engine metrics - orders: {} accepted, {} rejected | add_order latency (us): avg={:.2} min={:.2} max={:.2}",
                self.metrics.orders_processed(),
                self.metrics.orders_rejected(),
                stats.avg_micros(),
                stats.min_micros(),
                stats.max_micros(),
            );
        }
    }
}
