// Prometheus metrics definitions for the battle backend.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Battles currently live (team select or active).
    pub static ref ACTIVE_BATTLES: IntGauge =
        IntGauge::new("arena_active_battles", "Battles currently live").unwrap();

    /// Players waiting in the matchmaking queue.
    pub static ref MATCH_QUEUE_DEPTH: IntGauge =
        IntGauge::new("arena_match_queue_depth", "Players waiting for a match").unwrap();

    /// Live WebSocket connections.
    pub static ref CONNECTED_WEBSOCKETS: IntGauge =
        IntGauge::new("arena_connected_websockets", "Live WebSocket connections").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Total battles started (paired out of the queue).
    pub static ref BATTLES_STARTED_TOTAL: IntCounter =
        IntCounter::new("arena_battles_started_total", "Total battles started").unwrap();

    /// Total battles completed, by end reason.
    pub static ref BATTLES_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_battles_completed_total", "Total battles completed"),
        &["reason"],
    )
    .unwrap();

    /// Total rejected player actions, by error code.
    pub static ref ACTIONS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("arena_actions_rejected_total", "Total rejected player actions"),
        &["code"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Battle duration in seconds, by end reason.
    pub static ref BATTLE_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("arena_battle_duration_seconds", "Battle duration in seconds")
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["reason"],
    )
    .unwrap();

    /// Time spent applying one action and broadcasting, in milliseconds.
    pub static ref ACTION_APPLY_DURATION_MS: Histogram = Histogram::with_opts(
        HistogramOpts::new("arena_action_apply_duration_ms", "Action handling time in ms")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0]),
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_BATTLES.clone()),
        Box::new(MATCH_QUEUE_DEPTH.clone()),
        Box::new(CONNECTED_WEBSOCKETS.clone()),
        Box::new(BATTLES_STARTED_TOTAL.clone()),
        Box::new(BATTLES_COMPLETED_TOTAL.clone()),
        Box::new(ACTIONS_REJECTED_TOTAL.clone()),
        Box::new(BATTLE_DURATION_SECONDS.clone()),
        Box::new(ACTION_APPLY_DURATION_MS.clone()),
    ];

    for c in collectors {
        // Ignore double registration so tests can call this repeatedly.
        let _ = REGISTRY.register(c);
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
