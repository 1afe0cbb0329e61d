//! Configuration validation.
//!
//! # Responsibilities
//! - Filter the port list down to distinct ports in (0, 65535]
//! - Resolve banner keys to ports
//! - Check value ranges (capacity, timeouts, buffer sizes), both ends
//!
//! # Design Decisions
//! - Bad ports and bad banner keys are dropped with a warning, never fatal
//! - The only fatal outcome is an empty port set
//! - Runs once before anything binds

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::schema::{DecoyConfig, PortEntry};
use crate::net::connection::Banners;

/// Longest accepted connection timeout (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Configuration after validation; everything the runtime needs, typed.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub bind_address: IpAddr,
    pub ports: Vec<u16>,
    pub max_connections: usize,
    pub accept_backoff_base: Duration,
    pub accept_backoff_max: Duration,
    pub connection_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_logged_payload: usize,
    pub banners: Banners,
    pub drain_timeout: Duration,
}

/// Parse a single port entry. Returns `None` for anything outside (0, 65535].
pub fn parse_port(entry: &PortEntry) -> Option<u16> {
    let value = match entry {
        PortEntry::Number(n) => *n,
        PortEntry::Text(s) => s.trim().parse::<i64>().ok()?,
    };
    if (1..=65535).contains(&value) {
        Some(value as u16)
    } else {
        None
    }
}

/// Outcome of port filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSelection {
    /// Valid, distinct ports in the order given.
    pub ports: Vec<u16>,
    /// Entries that were dropped, as written. One warning was logged for each.
    pub rejected: Vec<String>,
}

/// Filter port entries, keeping the first occurrence of each valid port in
/// the order given.
pub fn validate_ports(entries: &[PortEntry]) -> PortSelection {
    let mut selection = PortSelection {
        ports: Vec::with_capacity(entries.len()),
        rejected: Vec::new(),
    };
    for entry in entries {
        match parse_port(entry) {
            Some(port) if selection.ports.contains(&port) => {
                tracing::warn!(port, "Duplicate port number ignored");
                selection.rejected.push(entry.to_string());
            }
            Some(port) => selection.ports.push(port),
            None => {
                tracing::warn!(port = %entry, "Invalid port number");
                selection.rejected.push(entry.to_string());
            }
        }
    }
    selection
}

/// Validate the raw configuration.
pub fn validate_config(config: &DecoyConfig) -> Result<ValidatedConfig, ConfigError> {
    let ports = validate_ports(&config.listener.ports).ports;
    if ports.is_empty() {
        return Err(ConfigError::NoValidPorts);
    }

    let bind_address: IpAddr = config.listener.bind_address.trim().parse().map_err(|_| {
        ConfigError::Invalid(format!(
            "bind_address '{}' is not an IP address",
            config.listener.bind_address
        ))
    })?;

    let mut problems = Vec::new();
    if config.listener.max_connections == 0 {
        problems.push("max_connections must be at least 1");
    }
    if config.listener.max_connections > tokio::sync::Semaphore::MAX_PERMITS {
        problems.push("max_connections exceeds the admission gate limit");
    }
    if config.connection.timeout_secs == 0 {
        problems.push("timeout_secs must be at least 1");
    }
    if config.connection.timeout_secs > MAX_TIMEOUT_SECS {
        problems.push("timeout_secs must not exceed 86400");
    }
    if config.connection.read_buffer_size == 0 {
        problems.push("read_buffer_size must be at least 1");
    }
    if config.listener.accept_backoff_base_ms > config.listener.accept_backoff_max_ms {
        problems.push("accept_backoff_base_ms must not exceed accept_backoff_max_ms");
    }
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems.join(", ")));
    }

    if config.listener.max_connections <= ports.len() {
        // Every idle accept loop holds one token while it waits.
        tracing::warn!(
            max_connections = config.listener.max_connections,
            ports = ports.len(),
            "max_connections does not exceed the number of ports; some ports may never be served"
        );
    }

    let mut per_port = HashMap::new();
    for (key, text) in &config.banners {
        match parse_port(&PortEntry::Text(key.clone())) {
            Some(port) => {
                if !ports.contains(&port) {
                    tracing::debug!(port, "Banner configured for a port that is not listened on");
                }
                per_port.insert(port, text.as_bytes().to_vec());
            }
            None => tracing::warn!(port = %key, "Invalid port in banner map, banner ignored"),
        }
    }

    Ok(ValidatedConfig {
        bind_address,
        ports,
        max_connections: config.listener.max_connections,
        accept_backoff_base: Duration::from_millis(config.listener.accept_backoff_base_ms),
        accept_backoff_max: Duration::from_millis(config.listener.accept_backoff_max_ms),
        connection_timeout: Duration::from_secs(config.connection.timeout_secs),
        read_buffer_size: config.connection.read_buffer_size,
        max_logged_payload: config.connection.max_logged_payload,
        banners: Banners::new(config.connection.default_response.as_bytes().to_vec(), per_port),
        drain_timeout: Duration::from_secs(config.shutdown.drain_timeout_secs),
    })
}
