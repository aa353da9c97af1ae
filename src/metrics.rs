//! Prometheus metrics for the bridge.
//!
//! - `bridge_live_puppets` - Puppet connections currently owned by the reactor
//! - `bridge_reconnects_total{kind}` - Reconnects and worker restarts by kind
//! - `bridge_messages_relayed_total{direction}` - Messages relayed (`to_irc`, `from_irc`)
//! - `bridge_relay_duration_seconds{direction}` - Relay latency histogram
//! - `bridge_fragments_sent_total` - PRIVMSG fragments produced by splitting
//! - `bridge_uploads_total{outcome}` - Uploads by outcome (`ok`, `failed`)
//! - `bridge_echo_dropped_total` - Observer messages dropped as puppet echoes
//! - `bridge_desync_heals_total` - Stale channel mappings removed

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Puppet connections currently alive.
pub static LIVE_PUPPETS: OnceLock<IntGauge> = OnceLock::new();

/// Reconnect attempts by connection kind.
pub static RECONNECTS: OnceLock<IntCounterVec> = OnceLock::new();

/// Messages relayed by direction.
pub static MESSAGES_RELAYED: OnceLock<IntCounterVec> = OnceLock::new();

/// Relay latency by direction.
pub static RELAY_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Fragments sent for oversized messages.
pub static FRAGMENTS_SENT: OnceLock<IntCounter> = OnceLock::new();

/// Uploads by outcome.
pub static UPLOADS: OnceLock<IntCounterVec> = OnceLock::new();

/// Observer messages dropped because a puppet sent them.
pub static ECHO_DROPPED: OnceLock<IntCounter> = OnceLock::new();

/// Channel mappings removed after a desync.
pub static DESYNC_HEALS: OnceLock<IntCounter> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls leave the first set in place.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::debug!(error = %e, concat!("Metric not registered: ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(LIVE_PUPPETS, IntGauge::new("bridge_live_puppets", "Live puppet connections"));
    register!(RECONNECTS, IntCounterVec::new(Opts::new("bridge_reconnects_total", "Reconnect attempts by connection kind"), &["kind"]));
    register!(MESSAGES_RELAYED, IntCounterVec::new(Opts::new("bridge_messages_relayed_total", "Messages relayed by direction"), &["direction"]));
    register!(RELAY_LATENCY, HistogramVec::new(
        HistogramOpts::new("bridge_relay_duration_seconds", "Relay latency by direction")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["direction"]));
    register!(FRAGMENTS_SENT, IntCounter::new("bridge_fragments_sent_total", "Fragments sent for oversized messages"));
    register!(UPLOADS, IntCounterVec::new(Opts::new("bridge_uploads_total", "Uploads by outcome"), &["outcome"]));
    register!(ECHO_DROPPED, IntCounter::new("bridge_echo_dropped_total", "Observer messages dropped as puppet echoes"));
    register!(DESYNC_HEALS, IntCounter::new("bridge_desync_heals_total", "Stale channel mappings removed"));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

fn inc_labeled(metric: &OnceLock<IntCounterVec>, label: &str) {
    if let Some(c) = metric.get() {
        c.with_label_values(&[label]).inc();
    }
}

fn inc(metric: &OnceLock<IntCounter>) {
    if let Some(c) = metric.get() {
        c.inc();
    }
}

/// Set the live puppet gauge.
#[inline]
pub fn set_live_puppets(count: usize) {
    if let Some(g) = LIVE_PUPPETS.get() {
        g.set(count as i64);
    }
}

/// Record a reconnect attempt.
#[inline]
pub fn record_reconnect(kind: &str) {
    inc_labeled(&RECONNECTS, kind);
}

/// Record a relayed message.
#[inline]
pub fn record_relay(direction: &str) {
    inc_labeled(&MESSAGES_RELAYED, direction);
}

/// Record relay latency.
#[inline]
pub fn record_relay_latency(direction: &str, duration_secs: f64) {
    if let Some(h) = RELAY_LATENCY.get() {
        h.with_label_values(&[direction]).observe(duration_secs);
    }
}

/// Record fragments produced by splitting one message.
#[inline]
pub fn record_fragments(count: usize) {
    if let Some(c) = FRAGMENTS_SENT.get() {
        c.inc_by(count as u64);
    }
}

/// Record an upload outcome.
#[inline]
pub fn record_upload(outcome: &str) {
    inc_labeled(&UPLOADS, outcome);
}

/// Record an echo drop.
#[inline]
pub fn record_echo_drop() {
    inc(&ECHO_DROPPED);
}

/// Record a desync heal.
#[inline]
pub fn record_desync_heal() {
    inc(&DESYNC_HEALS);
}
