//! Registry of live connections.
//!
//! # Responsibilities
//! - Hand out unique connection IDs
//! - Track every connection between accept and cleanup
//! - Drain all live connections on shutdown
//!
//! Insert, remove and snapshot happen under a short mutex section with no
//! I/O inside it. Closing a connection means cancelling its token, which is
//! done only after the lock has been released.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::net::admission::AdmissionToken;
use crate::observability::metrics;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// What the registry keeps for each live connection.
#[derive(Debug, Clone)]
struct Entry {
    peer: SocketAddr,
    port: u16,
    close: CancellationToken,
}

/// Concurrently shared set of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<ConnectionId, Entry>>,
    next_id: AtomicU64,
    /// Number of slots not yet dropped. Outlives registration when drained.
    live_tx: watch::Sender<usize>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        let (live_tx, _) = watch::channel(0);
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            live_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        // Critical sections never panic midway, so a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an admitted connection.
    ///
    /// The returned slot owns both the registration and the admission token;
    /// dropping it unregisters first and then releases the token.
    pub fn register(
        self: &Arc<Self>,
        token: AdmissionToken,
        peer: SocketAddr,
        port: u16,
    ) -> ConnectionSlot {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let close = CancellationToken::new();

        self.lock().insert(
            id,
            Entry {
                peer,
                port,
                close: close.clone(),
            },
        );
        self.live_tx.send_modify(|live| *live += 1);
        metrics::set_active_connections(*self.live_tx.borrow());

        ConnectionSlot {
            id,
            close,
            registry: Arc::clone(self),
            token: Some(token),
        }
    }

    /// Remove a connection. Removing an unknown or already removed ID is a no-op.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Close every registered connection and empty the registry.
    ///
    /// Entries removed concurrently by their own handler are simply not in
    /// the snapshot. Returns the number of connections closed by this call.
    pub fn close_all(&self) -> usize {
        let drained: Vec<(ConnectionId, Entry)> = {
            let mut entries = self.lock();
            entries.drain().collect()
        };

        for (id, entry) in &drained {
            tracing::debug!(
                connection_id = %id,
                port = entry.port,
                remote_addr = %entry.peer,
                "Closing connection"
            );
            entry.close.cancel();
        }

        let count = drained.len();
        tracing::info!(event = "connections_closed", count, "Closed remaining connections");
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Wait until no connection slot is alive.
    ///
    /// Slots drained by [`close_all`](Self::close_all) still count until
    /// their handler drops them.
    pub async fn wait_empty(&self) {
        let mut rx = self.live_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|live| *live == 0).await;
    }

    /// Connections registered since creation.
    pub fn registered_total(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed) - 1
    }

    /// Number of connection slots still alive, drained or not.
    pub fn live(&self) -> usize {
        *self.live_tx.borrow()
    }

    fn slot_dropped(&self) {
        self.live_tx.send_modify(|live| *live = live.saturating_sub(1));
        metrics::set_active_connections(*self.live_tx.borrow());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped ownership of one admitted, registered connection.
///
/// Dropping the slot unregisters the connection and then returns its
/// admission token, in that order, so a concurrent drain never sees an
/// entry whose capacity has already been handed back.
#[derive(Debug)]
pub struct ConnectionSlot {
    id: ConnectionId,
    close: CancellationToken,
    registry: Arc<ConnectionRegistry>,
    token: Option<AdmissionToken>,
}

impl ConnectionSlot {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Token cancelled when the registry drains this connection.
    pub fn close_token(&self) -> &CancellationToken {
        &self.close
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        self.registry.slot_dropped();
        drop(self.token.take());
        tracing::trace!(connection_id = %self.id, "Connection slot released");
    }
}
