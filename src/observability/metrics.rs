//! Metrics collection and exposition.
//!
//! # Metrics
//! - `websocket_proxy_sessions_total` (counter): sessions accepted
//! - `websocket_proxy_active_sessions` (gauge): sessions currently relaying
//! - `websocket_proxy_session_duration_seconds` (histogram): session lifetime
//! - `websocket_proxy_upgrade_rejections_total` (counter): refused upgrades
//! - `websocket_proxy_relay_errors_total` (counter): mid-session failures
//!
//! # Design Decisions
//! - Low-overhead metric updates (atomic operations)
//! - Recording is unconditional and cheap; exposition is config-gated

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus exporter on the given address.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter started"),
        Err(error) => tracing::error!(%error, "Failed to start metrics exporter"),
    }
}

/// A session finished both handshakes and began relaying.
pub fn session_opened() {
    counter!("websocket_proxy_sessions_total").increment(1);
    gauge!("websocket_proxy_active_sessions").increment(1.0);
}

/// A session fully terminated (both pumps returned).
pub fn session_closed(duration: Duration) {
    gauge!("websocket_proxy_active_sessions").decrement(1.0);
    histogram!("websocket_proxy_session_duration_seconds").record(duration.as_secs_f64());
}

/// An upgrade attempt was refused before or during the client handshake.
pub fn upgrade_rejected() {
    counter!("websocket_proxy_upgrade_rejections_total").increment(1);
}

/// A relay direction failed mid-session.
pub fn relay_error() {
    counter!("websocket_proxy_relay_errors_total").increment(1);
}
