// Prometheus metrics definitions for the ricochet backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Rooms with live state (subscribers or a board in play).
    pub static ref ACTIVE_ROOMS: IntGauge =
        IntGauge::new("ricochet_active_rooms", "Rooms with live state").unwrap();

    /// Games waiting for a board to be generated.
    pub static ref GENERATION_QUEUE_DEPTH: IntGauge =
        IntGauge::new("ricochet_generation_queue_depth", "Games waiting for a board").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("ricochet_connected_websockets", "Live WebSocket connections").unwrap();

    /// Engine worker threads currently running.
    pub static ref ENGINE_WORKERS_ACTIVE: IntGauge =
        IntGauge::new("ricochet_engine_workers_active", "Engine worker threads currently active").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Boards accepted by the solvability gate.
    pub static ref BOARDS_GENERATED_TOTAL: IntCounter = IntCounter::new(
        "ricochet_boards_generated_total",
        "Boards certified solvable",
    )
    .unwrap();

    /// Generation runs that produced no board, by reason.
    pub static ref GENERATION_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ricochet_generation_failures_total", "Generation runs without a board"),
        &["reason"],
    )
    .unwrap();

    /// Player moves, by result (accepted, rejected, solved).
    pub static ref MOVES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("ricochet_moves_total", "Player moves"),
        &["result"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Candidates tried per accepted board.
    pub static ref GENERATION_ATTEMPTS: Histogram = Histogram::with_opts(
        HistogramOpts::new("ricochet_generation_attempts", "Candidates tried per accepted board")
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0]),
    )
    .unwrap();

    /// Wall-clock time of a generate-and-verify run.
    pub static ref GENERATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("ricochet_generation_duration_seconds", "Generate-and-verify duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .unwrap();

    /// Length of certified solutions.
    pub static ref SOLUTION_LENGTH: Histogram = Histogram::with_opts(
        HistogramOpts::new("ricochet_solution_length", "Moves in certified solutions")
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 15.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_ROOMS.clone()),
        Box::new(GENERATION_QUEUE_DEPTH.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(ENGINE_WORKERS_ACTIVE.clone()),
        Box::new(BOARDS_GENERATED_TOTAL.clone()),
        Box::new(GENERATION_FAILURES_TOTAL.clone()),
        Box::new(MOVES_TOTAL.clone()),
        Box::new(GENERATION_ATTEMPTS.clone()),
        Box::new(GENERATION_DURATION_SECONDS.clone()),
        Box::new(SOLUTION_LENGTH.clone()),
    ];

    for c in collectors {
        if let Err(e) = REGISTRY.register(c) {
            tracing::warn!("Metric registration skipped: {e}");
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {e}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        let output = gather_metrics();
        assert!(output.is_empty() || output.contains("ricochet_"));
    }

    #[test]
    fn test_register_twice_does_not_panic() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_metric_increments() {
        GENERATION_QUEUE_DEPTH.set(3);
        assert_eq!(GENERATION_QUEUE_DEPTH.get(), 3);
        GENERATION_QUEUE_DEPTH.set(0);

        CONNECTED_WEBSOCKETS.inc();
        CONNECTED_WEBSOCKETS.dec();

        BOARDS_GENERATED_TOTAL.inc();
        GENERATION_FAILURES_TOTAL
            .with_label_values(&["budget"])
            .inc();
        MOVES_TOTAL.with_label_values(&["accepted"]).inc();

        GENERATION_ATTEMPTS.observe(2.0);
        GENERATION_DURATION_SECONDS.observe(0.02);
        SOLUTION_LENGTH.observe(4.0);
    }
}
