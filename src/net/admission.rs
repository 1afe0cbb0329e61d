//! Process-wide admission control.
//!
//! A single counting semaphore bounds how many connections are handled at
//! once across every port. Listeners acquire a token *before* calling
//! `accept()`, so once the cap is reached further peers wait in the kernel
//! listen backlog instead of becoming tasks.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::observability::metrics;

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    in_use: AtomicUsize,
    peak: AtomicUsize,
}

/// Bounded admission gate shared by all port listeners.
#[derive(Debug)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl AdmissionGate {
    /// Create a gate with `capacity` tokens.
    pub fn new(capacity: usize) -> Self {
        metrics::set_admission_available(capacity);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Wait for a token.
    ///
    /// Returns `None` once the gate has been closed, including for callers
    /// that were already waiting when it closed.
    pub async fn acquire(&self) -> Option<AdmissionToken> {
        let permit = self.semaphore.clone().acquire_owned().await.ok()?;

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        let in_use = self.counters.in_use.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(in_use, Ordering::SeqCst);
        metrics::set_admission_available(self.semaphore.available_permits());

        Some(AdmissionToken {
            permit: Some(permit),
            counters: Arc::clone(&self.counters),
            semaphore: Arc::clone(&self.semaphore),
        })
    }

    /// Stop handing out tokens. Tokens already held stay valid.
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            self.semaphore.close();
            tracing::debug!("Admission gate closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Configured maximum number of concurrent connections.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tokens currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Tokens currently held.
    pub fn in_use(&self) -> usize {
        self.counters.in_use.load(Ordering::SeqCst)
    }

    /// Highest number of tokens held at the same time since creation.
    pub fn peak_in_use(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }

    pub fn acquired_total(&self) -> u64 {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released_total(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }
}

/// One unit of admission capacity.
///
/// Released exactly once, when dropped. This holds on success, error and
/// panic paths alike.
#[derive(Debug)]
pub struct AdmissionToken {
    permit: Option<OwnedSemaphorePermit>,
    counters: Arc<Counters>,
    semaphore: Arc<Semaphore>,
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            // Counters first: once the permit is back another acquirer may run.
            self.counters.in_use.fetch_sub(1, Ordering::SeqCst);
            self.counters.released.fetch_add(1, Ordering::SeqCst);
            drop(permit);
            metrics::set_admission_available(self.semaphore.available_permits());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tokens_are_conserved() {
        let gate = AdmissionGate::new(2);

        let a = gate.acquire().await.unwrap();
        let b = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);
        assert_eq!(gate.in_use(), 2);

        drop(a);
        assert_eq!(gate.available(), 1);
        drop(b);

        assert_eq!(gate.acquired_total(), 2);
        assert_eq!(gate.released_total(), 2);
        assert_eq!(gate.in_use(), 0);
        assert_eq!(gate.peak_in_use(), 2);
    }

    #[tokio::test]
    async fn acquire_blocks_at_capacity() {
        let gate = AdmissionGate::new(1);
        let held = gate.acquire().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(blocked.is_err(), "second acquire should wait");

        drop(held);
        let next = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(matches!(next, Ok(Some(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn peak_never_exceeds_capacity_under_contention() {
        let gate = Arc::new(AdmissionGate::new(1));

        let mut workers = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            workers.push(tokio::spawn(async move {
                for _ in 0..20_000 {
                    let token = gate.acquire().await.unwrap();
                    drop(token);
                }
            }));
        }
        for worker in workers {
            worker.await.unwrap();
        }

        assert_eq!(gate.peak_in_use(), 1);
        assert_eq!(gate.acquired_total(), 160_000);
        assert_eq!(gate.released_total(), 160_000);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test]
    async fn close_wakes_waiters() {
        let gate = Arc::new(AdmissionGate::new(1));
        let _held = gate.acquire().await.unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.close();
        assert!(waiter.await.unwrap());
        assert!(gate.is_closed());
        assert!(gate.acquire().await.is_none());
    }
}
