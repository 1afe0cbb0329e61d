//! Per-connection handling.
//!
//! # Responsibilities
//! - Send the banner configured for the port (or the default response)
//! - Read at most one buffer from the peer
//! - Log the interaction and emit a `ConnectionRecord`
//!
//! Every step runs under one absolute deadline and can be interrupted by a
//! registry drain. Failures are logged and end only this connection.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::net::registry::ConnectionSlot;
use crate::observability::metrics;
use crate::resilience::{Deadline, Interrupted};

/// Responses sent on connect, by port.
#[derive(Debug, Clone)]
pub struct Banners {
    default: Arc<[u8]>,
    per_port: Arc<HashMap<u16, Arc<[u8]>>>,
}

impl Banners {
    pub fn new(default: Vec<u8>, per_port: HashMap<u16, Vec<u8>>) -> Self {
        Self {
            default: default.into(),
            per_port: Arc::new(
                per_port
                    .into_iter()
                    .map(|(port, banner)| (port, banner.into()))
                    .collect(),
            ),
        }
    }

    /// The exact bytes a peer connecting to `port` receives.
    pub fn for_port(&self, port: u16) -> &[u8] {
        self.per_port
            .get(&port)
            .map(|b| b.as_ref())
            .unwrap_or(&self.default)
    }

    pub fn default_response(&self) -> &[u8] {
        &self.default
    }

    /// Number of ports with their own banner.
    pub fn configured_ports(&self) -> usize {
        self.per_port.len()
    }
}

/// Settings shared by every handler.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub timeout: Duration,
    pub read_buffer_size: usize,
    pub max_logged_payload: usize,
    pub banners: Banners,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Banner sent and data read.
    DataReceived,
    /// Banner sent, peer closed without sending anything.
    PeerClosed,
    WriteFailed,
    ReadFailed,
    TimedOut,
    /// Closed by the registry drain during shutdown.
    Drained,
}

/// What is known about one connection. Discarded after it is logged.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionRecord {
    pub connection_id: u64,
    pub remote_addr: SocketAddr,
    pub local_port: u16,
    /// Accept time, milliseconds since the Unix epoch.
    pub accepted_at_ms: u64,
    /// Deadline, milliseconds since the Unix epoch.
    pub deadline_ms: u64,
    pub bytes_read: usize,
    pub banner_sent: bool,
    pub outcome: Outcome,
}

impl ConnectionRecord {
    fn new(slot: &ConnectionSlot, remote_addr: SocketAddr, local_port: u16, timeout: Duration) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            connection_id: slot.id().as_u64(),
            remote_addr,
            local_port,
            accepted_at_ms: epoch_millis(now),
            deadline_ms: epoch_millis(now.saturating_add(timeout)),
            bytes_read: 0,
            banner_sent: false,
            outcome: Outcome::PeerClosed,
        }
    }
}

fn epoch_millis(since_epoch: Duration) -> u64 {
    u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
}

/// Render a received payload for the log: trailing NULs and whitespace
/// removed, cut to `max` bytes, non-UTF-8 replaced.
pub fn trim_payload(data: &[u8], max: usize) -> String {
    let end = data
        .iter()
        .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let trimmed = &data[..end.min(max)];
    String::from_utf8_lossy(trimmed).into_owned()
}

/// Handle one admitted connection to completion.
///
/// The socket is closed before `slot` is dropped, so once the registry
/// reports no live slots every handled socket is closed.
pub async fn handle_connection(
    mut stream: TcpStream,
    remote_addr: SocketAddr,
    port: u16,
    slot: ConnectionSlot,
    config: Arc<HandlerConfig>,
) -> ConnectionRecord {
    let deadline = Deadline::after(config.timeout);
    let close = slot.close_token().clone();
    let mut record = ConnectionRecord::new(&slot, remote_addr, port, config.timeout);

    let outcome = exchange(&mut stream, &deadline, &close, &config, &mut record).await;
    record.outcome = outcome;

    drop(stream);
    drop(slot);

    tracing::debug!(
        connection_id = record.connection_id,
        record = %serde_json::to_string(&record).unwrap_or_default(),
        "Connection finished"
    );
    record
}

async fn exchange(
    stream: &mut TcpStream,
    deadline: &Deadline,
    close: &tokio_util::sync::CancellationToken,
    config: &HandlerConfig,
    record: &mut ConnectionRecord,
) -> Outcome {
    let port = record.local_port;
    let remote_addr = record.remote_addr;

    let banner = config.banners.for_port(port);
    match deadline.run(close, stream.write_all(banner)).await {
        Ok(Ok(())) => record.banner_sent = true,
        Ok(Err(e)) => {
            tracing::warn!(event = "write_error", port, remote_addr = %remote_addr, error = %e, "Error writing to connection");
            return Outcome::WriteFailed;
        }
        Err(reason) => {
            tracing::warn!(event = "write_error", port, remote_addr = %remote_addr, error = %reason, "Error writing to connection");
            return interrupted(reason);
        }
    }

    let mut buffer = vec![0u8; config.read_buffer_size];
    match deadline.run(close, stream.read(&mut buffer)).await {
        Ok(Ok(0)) => {
            tracing::debug!(port, remote_addr = %remote_addr, "Peer closed without sending data");
            Outcome::PeerClosed
        }
        Ok(Ok(n)) => {
            record.bytes_read = n;
            metrics::record_bytes_received(port, n);
            tracing::info!(
                event = "data_received",
                port,
                remote_addr = %remote_addr,
                byte_count = n,
                payload = %trim_payload(&buffer[..n], config.max_logged_payload),
                "Read data from connection"
            );
            Outcome::DataReceived
        }
        Ok(Err(e)) => {
            tracing::warn!(event = "read_error", port, remote_addr = %remote_addr, error = %e, "Error reading from connection");
            Outcome::ReadFailed
        }
        Err(reason) => {
            tracing::warn!(event = "read_error", port, remote_addr = %remote_addr, error = %reason, "Error reading from connection");
            interrupted(reason)
        }
    }
}

fn interrupted(reason: Interrupted) -> Outcome {
    match reason {
        Interrupted::TimedOut => Outcome::TimedOut,
        Interrupted::Cancelled => Outcome::Drained,
    }
}
