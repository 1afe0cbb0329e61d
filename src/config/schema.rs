//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the decoy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration for the decoy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DecoyConfig {
    /// Listener configuration (bind address, ports, admission capacity).
    pub listener: ListenerConfig,

    /// Per-connection behaviour.
    pub connection: ConnectionConfig,

    /// Port-specific banners, keyed by port number as text.
    pub banners: BTreeMap<String, String>,

    /// Shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A port entry as written by the operator.
///
/// TOML files may list ports as integers or strings, and the command line
/// always yields strings. Nothing is interpreted until validation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortEntry {
    Number(i64),
    Text(String),
}

impl fmt::Display for PortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortEntry::Number(n) => write!(f, "{}", n),
            PortEntry::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PortEntry {
    fn from(s: &str) -> Self {
        PortEntry::Text(s.to_string())
    }
}

impl From<u16> for PortEntry {
    fn from(n: u16) -> Self {
        PortEntry::Number(n as i64)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host address every port listener binds to (e.g., "0.0.0.0").
    pub bind_address: String,

    /// Ports to open, in order.
    pub ports: Vec<PortEntry>,

    /// Maximum concurrently handled connections across all ports.
    pub max_connections: usize,

    /// Base delay after a failed accept, in milliseconds.
    pub accept_backoff_base_ms: u64,

    /// Ceiling for the accept backoff, in milliseconds.
    pub accept_backoff_max_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            ports: vec![PortEntry::Number(22), PortEntry::Number(80), PortEntry::Number(8080)],
            max_connections: 100,
            accept_backoff_base_ms: 5,
            accept_backoff_max_ms: 1000,
        }
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Absolute deadline for all I/O on a connection, in seconds.
    pub timeout_secs: u64,

    /// Size of the single inbound read.
    pub read_buffer_size: usize,

    /// Payload bytes kept in the `data_received` log line.
    pub max_logged_payload: usize,

    /// Response sent on ports without a configured banner.
    pub default_response: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            read_buffer_size: 1024,
            max_logged_payload: 512,
            default_response: "Authentication failed.".to_string(),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for handlers to finish after the registry is drained.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_secs: 5 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Console log format.
    pub log_format: LogFormat,

    /// Directory for the daily rolling log file, created if missing. Empty
    /// disables file output.
    pub log_dir: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            log_dir: "logs".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let config: DecoyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.max_connections, 100);
        assert_eq!(config.connection.timeout_secs, 10);
        assert_eq!(config.connection.default_response, "Authentication failed.");
        assert_eq!(config.listener.ports.len(), 3);
        assert_eq!(config.observability.log_dir, "logs");
    }

    #[test]
    fn file_logging_can_be_disabled() {
        let config: DecoyConfig = toml::from_str(
            r#"
            [observability]
            log_dir = ""
            "#,
        )
        .unwrap();
        assert!(config.observability.log_dir.is_empty());
    }

    #[test]
    fn ports_accept_numbers_and_strings() {
        let config: DecoyConfig = toml::from_str(
            r#"
            [listener]
            ports = [22, "80", "abc"]

            [banners]
            "2222" = "SSH-2.0-fake\n"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.listener.ports,
            vec![
                PortEntry::Number(22),
                PortEntry::Text("80".into()),
                PortEntry::Text("abc".into())
            ]
        );
        assert_eq!(config.banners["2222"], "SSH-2.0-fake\n");
    }

    #[test]
    fn log_format_is_lowercase() {
        let config: DecoyConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
