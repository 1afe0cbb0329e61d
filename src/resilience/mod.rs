//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection I/O:
//!     → timeouts.rs (one absolute deadline per connection, cancellable)
//!
//! Accept loop failures:
//!     → backoff.rs (capped exponential delay before retrying accept)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every peer interaction has a deadline
//! - Jittered backoff keeps an error-looping listener from spinning

pub mod backoff;
pub mod timeouts;

pub use backoff::calculate_backoff;
pub use timeouts::{Deadline, Interrupted};
