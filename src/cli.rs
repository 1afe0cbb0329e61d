//! Command line surface.
//!
//! Flags override individual fields of the file configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{DecoyConfig, LogFormat, PortEntry};

#[derive(Debug, Parser)]
#[command(name = "port-decoy")]
#[command(version, about = "Low-interaction TCP decoy listening on many ports", long_about = None)]
pub struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Comma-separated list of ports to listen on.
    #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
    pub ports: Option<Vec<String>>,

    /// Address every port binds to.
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Maximum concurrently handled connections across all ports.
    #[arg(short, long)]
    pub max_connections: Option<usize>,

    /// Per-connection deadline in seconds.
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,

    /// Port-specific banner, `PORT=TEXT`. Repeatable. Supports \n \r \t \\ escapes.
    #[arg(long = "banner", value_name = "PORT=TEXT", value_parser = parse_banner)]
    pub banners: Vec<(String, String)>,

    /// Response for ports without a banner.
    #[arg(long)]
    pub default_response: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory for daily rolling log files (default "logs"; "" disables).
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Emit console logs as JSON.
    #[arg(long)]
    pub json_logs: bool,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_address: Option<String>,
}

impl Cli {
    /// Apply command line overrides on top of `config`.
    pub fn apply(&self, config: &mut DecoyConfig) {
        if let Some(ports) = &self.ports {
            config.listener.ports = ports.iter().map(|p| PortEntry::Text(p.clone())).collect();
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }
        if let Some(max) = self.max_connections {
            config.listener.max_connections = max;
        }
        if let Some(secs) = self.timeout_secs {
            config.connection.timeout_secs = secs;
        }
        for (port, text) in &self.banners {
            config.banners.insert(port.clone(), text.clone());
        }
        if let Some(response) = &self.default_response {
            config.connection.default_response = unescape(response);
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.observability.log_dir = dir.clone();
        }
        if self.json_logs {
            config.observability.log_format = LogFormat::Json;
        }
        if let Some(addr) = &self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.clone();
        }
    }
}

/// Parse `PORT=TEXT`. The port is kept as text and validated later.
pub fn parse_banner(raw: &str) -> Result<(String, String), String> {
    let (port, text) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PORT=TEXT, got '{}'", raw))?;
    let port = port.trim();
    if port.is_empty() {
        return Err(format!("missing port in '{}'", raw));
    }
    Ok((port.to_string(), unescape(text)))
}

/// Expand `\n`, `\r`, `\t` and `\\`. Unknown escapes are kept verbatim.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
