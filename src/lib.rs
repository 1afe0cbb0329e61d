//! Low-interaction multi-port TCP decoy.
//!
//! Opens a listener on every configured port, sends each peer a banner,
//! records one read of whatever it sends back, and closes. Concurrency is
//! bounded by one admission gate shared across all ports, and shutdown
//! drains every live connection before returning.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::{DecoyConfig, ValidatedConfig};
pub use lifecycle::{Decoy, RunningDecoy, ShutdownSignal};
