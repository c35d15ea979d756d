//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the WebSocket reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Backend target definition.
    pub backend: BackendConfig,

    /// Upgrade parameters applied to both sides of a session.
    pub upgrade: UpgradeConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Backend target configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend WebSocket URL (e.g., "ws://127.0.0.1:3000"). Both "ws" and
    /// "wss" schemes are accepted.
    pub url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000".to_string(),
        }
    }
}

/// Upgrade parameters for the client-facing and backend-facing handshakes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Read buffer size in bytes for each WebSocket connection.
    pub read_buffer_size: usize,

    /// Write buffer size in bytes for each WebSocket connection.
    pub write_buffer_size: usize,

    /// Maximum complete message size in bytes.
    pub max_message_size: usize,

    /// Maximum single frame size in bytes.
    pub max_frame_size: usize,

    /// Subprotocols this proxy is willing to negotiate on behalf of the
    /// backend. Empty means "whatever the backend agrees to".
    pub subprotocols: Vec<String>,

    /// Origin acceptance policy for inbound upgrade requests.
    pub origin: OriginConfig,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 4096,
            write_buffer_size: 4096,
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
            subprotocols: Vec::new(),
            origin: OriginConfig::default(),
        }
    }
}

/// Origin acceptance policy.
///
/// With `allow_any` set the proxy imposes no origin policy at all. Otherwise
/// origins must match one of the glob patterns in `allowlist` (localhost
/// origins and requests without an Origin header are always accepted).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// Accept every origin unconditionally.
    pub allow_any: bool,

    /// Glob patterns (`*` wildcard) matched against the Origin header.
    pub allowlist: Vec<String>,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            allow_any: true,
            allowlist: Vec::new(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Upper bound on a single control-frame (ping/pong/close) write, in
    /// milliseconds. A wedged peer fails the relay direction instead of
    /// stalling it.
    pub control_write_millis: u64,

    /// Grace period in seconds granted to the surviving relay direction to
    /// finish the close handshake before its transport is force-closed.
    pub close_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            control_write_millis: 1000,
            close_grace_secs: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_transparent_relay() {
        let config = ProxyConfig::default();
        assert_eq!(config.upgrade.read_buffer_size, 4096);
        assert_eq!(config.upgrade.write_buffer_size, 4096);
        assert!(config.upgrade.origin.allow_any);
        assert_eq!(config.timeouts.control_write_millis, 1000);
    }

    #[test]
    fn minimal_toml_deserializes() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [backend]
            url = "wss://upstream.internal/socket"

            [upgrade.origin]
            allow_any = false
            allowlist = ["https://*.example.com"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.backend.url, "wss://upstream.internal/socket");
        assert!(!config.upgrade.origin.allow_any);
        assert_eq!(config.upgrade.origin.allowlist.len(), 1);
        // Unspecified sections fall back to defaults.
        assert_eq!(config.timeouts.connect_secs, 5);
    }
}
