//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files;
//! every field has a default so a minimal config is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Backend dispatch loop settings.
    pub backend: BackendConfig,

    /// Web-facing gateway settings.
    pub web: WebConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Settings for the backend dispatch loop and its transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Endpoint of the routed query service (e.g. "tcp://127.0.0.1:9091").
    pub query_endpoint: String,

    /// Endpoint of the heartbeat publisher.
    pub heartbeat_endpoint: String,

    /// Upper bound on one poll wait, in milliseconds.
    pub poll_interval_ms: u64,

    /// Interval between heartbeat publishes, in milliseconds.
    pub heartbeat_interval_ms: u64,

    /// Depth of the wakeup queue between the send relay and the loop.
    pub send_queue_depth: usize,

    /// Upper bound on one encoded transport message.
    pub max_message_length: usize,

    /// Per-request debug logging in the dispatch loop.
    pub log_requests: bool,

    /// Server certificate (PEM). Setting this enables peer authentication.
    pub server_certificate: Option<PathBuf>,

    /// Allow-listed client certificates: a PEM file or a directory of them.
    /// Absent means any presented certificate is accepted.
    pub client_certificates_path: Option<PathBuf>,

    /// Certificate this process presents when connecting to an
    /// authenticated backend.
    pub client_certificate: Option<PathBuf>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            query_endpoint: "tcp://127.0.0.1:9091".to_string(),
            heartbeat_endpoint: "tcp://127.0.0.1:9092".to_string(),
            poll_interval_ms: 100,
            heartbeat_interval_ms: 5_000,
            send_queue_depth: 128,
            max_message_length: 1 << 20,
            log_requests: false,
            server_certificate: None,
            client_certificates_path: None,
            client_certificate: None,
        }
    }
}

/// Settings for the web-facing gateway.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address (e.g. "0.0.0.0:9071").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Upper bound on one incoming websocket frame payload. Small on
    /// purpose: incoming queries are tiny and this bounds hostile buffering.
    pub max_incoming_frame_length: usize,

    /// Origins accepted for websocket upgrades; substring match, empty
    /// admits every origin.
    pub allowed_origins: Vec<String>,

    /// Root for static assets, served by an outer layer. Validated for
    /// existence at startup when set.
    pub document_root: Option<PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9071".to_string(),
            max_connections: 10_000,
            max_incoming_frame_length: 4096,
            allowed_origins: Vec::new(),
            document_root: None,
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter bind address.
    pub metrics_address: String,

    /// Default tracing filter when RUST_LOG is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9102".to_string(),
            log_filter: "query_gateway=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_form_a_runnable_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.backend.query_endpoint, "tcp://127.0.0.1:9091");
        assert_eq!(config.backend.poll_interval_ms, 100);
        assert_eq!(config.web.max_incoming_frame_length, 4096);
        assert!(config.web.allowed_origins.is_empty());
        assert!(!config.observability.metrics_enabled);
    }

    #[test]
    fn minimal_toml_deserializes_with_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [backend]
            query_endpoint = "tcp://0.0.0.0:7001"

            [web]
            bind_address = "0.0.0.0:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.query_endpoint, "tcp://0.0.0.0:7001");
        assert_eq!(config.backend.heartbeat_interval_ms, 5_000);
        assert_eq!(config.web.bind_address, "0.0.0.0:8080");
        assert_eq!(config.web.max_connections, 10_000);
    }
}
