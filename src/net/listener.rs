//! Per-port TCP listener with backpressure.
//!
//! # Responsibilities
//! - Bind one passive socket per configured port
//! - Acquire an admission token before every accept
//! - Register accepted connections and dispatch a handler task
//! - Stop promptly when the shutdown signal fires
//!
//! # State Machine
//! ```text
//! Created → Listening → Stopping → Stopped
//! ```
//! Each port runs its own loop so a slow or failing port never delays another.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::admission::AdmissionGate;
use crate::net::connection::{handle_connection, HandlerConfig};
use crate::net::registry::ConnectionRegistry;
use crate::observability::metrics;
use crate::resilience::calculate_backoff;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Lifecycle of a port listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Listening,
    Stopping,
    Stopped,
}

/// Everything an accept loop shares with the rest of the process.
#[derive(Clone)]
pub struct AcceptContext {
    pub gate: Arc<AdmissionGate>,
    pub registry: Arc<ConnectionRegistry>,
    pub shutdown: ShutdownSignal,
    pub handler: Arc<HandlerConfig>,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// Counters reported when a listener stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    pub port: u16,
    pub accepted: u64,
    pub accept_errors: u64,
}

/// Source of inbound connections for one port.
///
/// Cancel-safe: dropping the returned future must not lose a connection.
pub trait Acceptor: Send + 'static {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// A bound listener for one port.
pub struct PortListener<A = TcpListener> {
    port: u16,
    inner: A,
    state: ListenerState,
}

impl PortListener<TcpListener> {
    /// Bind `address:port`.
    pub async fn bind(address: IpAddr, port: u16) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(SocketAddr::new(address, port))
            .await
            .map_err(|source| ListenerError::Bind { port, source })?;

        let bound = Self::listening(port, listener);
        tracing::info!(event = "listener_started", port, address = %address, "Listening on port");
        Ok(bound)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }
}

impl<A: Acceptor> PortListener<A> {
    /// Wrap an acceptor that is already listening on `port`.
    pub(crate) fn listening(port: u16, inner: A) -> Self {
        let mut state = ListenerState::Created;
        transition(port, &mut state, ListenerState::Listening);
        Self { port, inner, state }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Run the accept loop until the shutdown signal fires or the admission
    /// gate closes. The passive socket is closed when this returns.
    pub async fn run(mut self, ctx: AcceptContext) -> ListenerStats {
        let port = self.port;
        let mut stats = ListenerStats {
            port,
            ..Default::default()
        };
        let mut consecutive_failures: u32 = 0;

        loop {
            // Acquire before accept (backpressure)
            let token = tokio::select! {
                biased;
                _ = ctx.shutdown.cancelled() => break,
                token = ctx.gate.acquire() => match token {
                    Some(token) => token,
                    None => break,
                },
            };

            let accepted = tokio::select! {
                biased;
                _ = ctx.shutdown.cancelled() => break,
                res = self.inner.accept() => res,
            };

            match accepted {
                Ok((stream, remote_addr)) => {
                    consecutive_failures = 0;
                    stats.accepted += 1;

                    let slot = ctx.registry.register(token, remote_addr, port);
                    metrics::record_connection(port);
                    tracing::info!(
                        event = "connection_received",
                        port,
                        remote_addr = %remote_addr,
                        connection_id = %slot.id(),
                        available_permits = ctx.gate.available(),
                        "Received connection"
                    );

                    tokio::spawn(handle_connection(
                        stream,
                        remote_addr,
                        port,
                        slot,
                        Arc::clone(&ctx.handler),
                    ));
                }
                Err(e) => {
                    drop(token);
                    stats.accept_errors += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    metrics::record_accept_error(port);

                    let delay = calculate_backoff(consecutive_failures, ctx.backoff_base, ctx.backoff_max);
                    tracing::warn!(
                        event = "accept_error",
                        port,
                        error = %e,
                        retry_in = ?delay,
                        "Error accepting connection"
                    );

                    tokio::select! {
                        biased;
                        _ = ctx.shutdown.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        transition(port, &mut self.state, ListenerState::Stopping);
        drop(self.inner);
        transition(port, &mut self.state, ListenerState::Stopped);
        tracing::info!(
            event = "listener_stopped",
            port,
            accepted = stats.accepted,
            accept_errors = stats.accept_errors,
            "Listener stopped"
        );
        stats
    }
}

fn transition(port: u16, state: &mut ListenerState, next: ListenerState) {
    tracing::debug!(port, from = ?*state, to = ?next, "Listener state change");
    *state = next;
}
