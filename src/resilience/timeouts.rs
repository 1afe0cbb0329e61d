//! Timeout enforcement.
//!
//! # Responsibilities
//! - Give each connection one absolute deadline covering all of its I/O
//! - Let a drain cancel an operation that is waiting on the peer
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout and cancellation are distinct outcomes, both distinct from I/O errors

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Why an operation did not run to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    #[error("deadline exceeded")]
    TimedOut,
    #[error("connection closed by shutdown")]
    Cancelled,
}

/// An absolute point in time after which no more I/O is attempted.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now. Durations past what the clock can
    /// represent are clamped to roughly thirty years out.
    pub fn after(timeout: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self { at }
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Drive `fut` until it completes, the deadline passes, or `cancel` fires.
    pub async fn run<F>(&self, cancel: &CancellationToken, fut: F) -> Result<F::Output, Interrupted>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Interrupted::Cancelled),
            res = tokio::time::timeout_at(self.at, fut) => res.map_err(|_| Interrupted::TimedOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_before_deadline() {
        let deadline = Deadline::after(Duration::from_secs(5));
        let token = CancellationToken::new();
        assert_eq!(deadline.run(&token, async { 7 }).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_absolute() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let token = CancellationToken::new();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let res = deadline
            .run(&token, tokio::time::sleep(Duration::from_millis(600)))
            .await;
        assert_eq!(res, Err(Interrupted::TimedOut));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[tokio::test]
    async fn unbounded_timeout_does_not_overflow() {
        let deadline = Deadline::after(Duration::MAX);
        assert!(deadline.remaining() > Duration::from_secs(86_400 * 365));

        let token = CancellationToken::new();
        assert_eq!(deadline.run(&token, async { "done" }).await, Ok("done"));
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let deadline = Deadline::after(Duration::from_secs(30));
        let token = CancellationToken::new();
        token.cancel();

        let res = deadline.run(&token, std::future::pending::<()>()).await;
        assert_eq!(res, Err(Interrupted::Cancelled));
    }
}
