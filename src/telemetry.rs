//! Telemetry utilities: subscriber setup, relay timing and spans.

use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Hosts that already installed a global subscriber keep theirs; the
/// call is then a no-op.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .try_init();
}

/// Guard for timing one relayed message and recording metrics.
///
/// Records relay latency when dropped.
pub struct RelayTimer {
    direction: &'static str,
    start: Instant,
}

impl RelayTimer {
    /// Start timing a relay in `direction` (`to_irc` or `from_irc`).
    pub fn new(direction: &'static str) -> Self {
        Self {
            direction,
            start: Instant::now(),
        }
    }
}

impl Drop for RelayTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_relay_latency(self.direction, duration);
    }
}

/// Standardized span constructors for bridge connections.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for a puppet connection.
    pub fn puppet(address: &str, nick: &str) -> Span {
        info_span!("puppet", address = %address, nick = %nick)
    }

    /// Span for the observer connection.
    pub fn observer(nick: &str) -> Span {
        info_span!("observer", nick = %nick)
    }
}
