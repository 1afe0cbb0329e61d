//! Shutdown coordination for the decoy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::net::{AdmissionGate, ConnectionRegistry, ListenerStats};

/// Process-wide, single-fire stop request.
///
/// Cloning shares the same underlying state. Once triggered it never resets.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move from running to stopping.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn trigger(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::SeqCst);
        self.token.cancel();
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Completes once the signal has been triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Listeners whose accept loop exited.
    pub listeners: Vec<ListenerStats>,
    /// Connections still registered when the drain ran.
    pub connections_closed: usize,
    /// Whether every handler released its slot within the drain timeout.
    pub drained: bool,
}

/// Coordinator for graceful shutdown.
///
/// Order: trigger the signal, close the admission gate, wait for every
/// accept loop to exit, drain the registry, wait for handlers to release
/// their slots.
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
    gate: Arc<AdmissionGate>,
    registry: Arc<ConnectionRegistry>,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        signal: ShutdownSignal,
        gate: Arc<AdmissionGate>,
        registry: Arc<ConnectionRegistry>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            signal,
            gate,
            registry,
            drain_timeout,
        }
    }

    /// Stop everything and return once no listener or connection remains.
    pub async fn shutdown(&self, mut listeners: JoinSet<ListenerStats>) -> ShutdownReport {
        if self.signal.trigger() {
            tracing::debug!("Shutdown signal triggered by coordinator");
        }
        self.gate.close();

        let mut report = ShutdownReport::default();
        while let Some(joined) = listeners.join_next().await {
            match joined {
                Ok(stats) => report.listeners.push(stats),
                Err(e) => tracing::error!(error = %e, "Listener task failed"),
            }
        }

        report.connections_closed = self.registry.close_all();

        report.drained = tokio::time::timeout(self.drain_timeout, self.registry.wait_empty())
            .await
            .is_ok();
        if !report.drained {
            tracing::warn!(
                live = self.registry.live(),
                timeout = ?self.drain_timeout,
                "Connections still open after drain timeout"
            );
        }

        tracing::info!(
            event = "shutdown_complete",
            listeners = report.listeners.len(),
            connections_closed = report.connections_closed,
            "Shutdown complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_is_single_fire() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!signal.is_triggered());

        assert!(clone.trigger());
        assert!(!signal.trigger());
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn cancelled_resolves_after_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn empty_shutdown_completes() {
        let signal = ShutdownSignal::new();
        let coordinator = ShutdownCoordinator::new(
            signal.clone(),
            Arc::new(AdmissionGate::new(1)),
            Arc::new(ConnectionRegistry::new()),
            Duration::from_secs(1),
        );
        let report = coordinator.shutdown(JoinSet::new()).await;
        assert!(report.drained);
        assert_eq!(report.connections_closed, 0);
        assert!(signal.is_triggered());
    }
}
