//! Startup orchestration.
//!
//! # Responsibilities
//! - Own the admission gate, connection registry and shutdown signal
//! - Bind one listener per validated port
//! - Spawn the accept loops and hand back a running handle
//!
//! # Design Decisions
//! - A bind failure ends only that port; startup fails only if no port binds
//! - Listeners start last, once shared state exists

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::ValidatedConfig;
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownSignal};
use crate::net::{AcceptContext, AdmissionGate, ConnectionRegistry, HandlerConfig, ListenerStats, PortListener};

/// Error type for startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("No listener could be started on any of {attempted} port(s)")]
    NoListeners { attempted: usize },
}

/// The decoy application: shared state plus validated configuration.
pub struct Decoy {
    config: ValidatedConfig,
    gate: Arc<AdmissionGate>,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownSignal,
}

impl Decoy {
    pub fn new(config: ValidatedConfig) -> Self {
        Self {
            gate: Arc::new(AdmissionGate::new(config.max_connections)),
            registry: Arc::new(ConnectionRegistry::new()),
            shutdown: ShutdownSignal::new(),
            config,
        }
    }

    pub fn gate(&self) -> &Arc<AdmissionGate> {
        &self.gate
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Bind every configured port and start accepting.
    pub async fn start(&self) -> Result<RunningDecoy, StartupError> {
        let ctx = AcceptContext {
            gate: Arc::clone(&self.gate),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.clone(),
            handler: Arc::new(HandlerConfig {
                timeout: self.config.connection_timeout,
                read_buffer_size: self.config.read_buffer_size,
                max_logged_payload: self.config.max_logged_payload,
                banners: self.config.banners.clone(),
            }),
            backoff_base: self.config.accept_backoff_base,
            backoff_max: self.config.accept_backoff_max,
        };

        let mut listeners = JoinSet::new();
        let mut bound = Vec::with_capacity(self.config.ports.len());

        for &port in &self.config.ports {
            let listener = match PortListener::bind(self.config.bind_address, port).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(event = "listen_error", port, error = %e, "Error listening on port");
                    continue;
                }
            };
            match listener.local_addr() {
                Ok(addr) => bound.push(addr),
                Err(e) => tracing::debug!(port, error = %e, "Could not read local address"),
            }
            listeners.spawn(listener.run(ctx.clone()));
        }

        if listeners.is_empty() {
            return Err(StartupError::NoListeners {
                attempted: self.config.ports.len(),
            });
        }

        tracing::info!(
            listeners = listeners.len(),
            max_connections = self.gate.capacity(),
            timeout = ?self.config.connection_timeout,
            "Decoy started"
        );

        Ok(RunningDecoy {
            listeners,
            bound,
            signal: self.shutdown.clone(),
            coordinator: ShutdownCoordinator::new(
                self.shutdown.clone(),
                Arc::clone(&self.gate),
                Arc::clone(&self.registry),
                self.config.drain_timeout,
            ),
        })
    }
}

/// Handle to a started decoy.
pub struct RunningDecoy {
    listeners: JoinSet<ListenerStats>,
    bound: Vec<SocketAddr>,
    signal: ShutdownSignal,
    coordinator: ShutdownCoordinator,
}

impl RunningDecoy {
    /// Local addresses of the listeners that bound successfully.
    pub fn bound_addrs(&self) -> &[SocketAddr] {
        &self.bound
    }

    /// Run until `stop` completes or the shutdown signal is triggered
    /// elsewhere, then shut down.
    pub async fn run_until<F>(self, stop: F) -> ShutdownReport
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = stop => {}
            _ = self.signal.cancelled() => {}
        }
        self.shutdown().await
    }

    /// Shut down now.
    pub async fn shutdown(self) -> ShutdownReport {
        self.coordinator.shutdown(self.listeners).await
    }
}
