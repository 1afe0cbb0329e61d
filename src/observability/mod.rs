//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listeners, handlers, lifecycle produce:
//!     → logging.rs (structured events, console and optional daily file)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → Operator console / log files
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every event carries an `event` field naming it, plus port and peer
//! - Logging never gates correctness; failures to log are ignored

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
