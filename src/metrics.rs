//! Prometheus metrics for confgate

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use tracing::error;

/// Global metrics instance
pub struct Metrics {
    pub registry: Registry,

    // Session metrics
    pub active_sessions: IntGauge,
    pub total_sessions: IntCounter,
    pub rejected_sessions: IntCounter,
    pub idle_closed_sessions: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Request counters
    pub requests: IntCounter,
    pub redirects: IntCounter,
    pub slow_commands: IntCounter,

    // Latency histograms
    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
    pub reply_errors: IntCounter,
    pub stats_errors: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("valid counter definition");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let active_sessions =
            IntGauge::new("confgate_active_sessions", "Current open sessions")
                .expect("valid gauge definition");
        registry
            .register(Box::new(active_sessions.clone()))
            .expect("gauge registered once");

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confgate_cmd_latency_seconds",
                "Command execution latency in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]),
        )
        .expect("valid histogram definition");
        registry
            .register(Box::new(cmd_latency.clone()))
            .expect("histogram registered once");

        Self {
            total_sessions: counter(&registry, "confgate_sessions_total", "Total sessions accepted"),
            rejected_sessions: counter(
                &registry,
                "confgate_rejected_sessions_total",
                "Sessions rejected at the connection limit",
            ),
            idle_closed_sessions: counter(
                &registry,
                "confgate_idle_closed_sessions_total",
                "Sessions closed by the idle reaper",
            ),
            bytes_read: counter(&registry, "confgate_bytes_read_total", "Total bytes read"),
            bytes_written: counter(&registry, "confgate_bytes_written_total", "Total bytes written"),
            requests: counter(&registry, "confgate_requests_total", "Requests dispatched"),
            redirects: counter(
                &registry,
                "confgate_redirects_total",
                "Replies redirecting the client to the leader",
            ),
            slow_commands: counter(
                &registry,
                "confgate_slow_commands_total",
                "Commands at or above the slow log threshold",
            ),
            protocol_errors: counter(
                &registry,
                "confgate_protocol_errors_total",
                "Sessions closed for oversized or undecodable input",
            ),
            reply_errors: counter(
                &registry,
                "confgate_reply_errors_total",
                "Replies replaced by the fallback error",
            ),
            stats_errors: counter(
                &registry,
                "confgate_stats_errors_total",
                "Statistics sink failures",
            ),
            active_sessions,
            cmd_latency,
            registry,
        }
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
