//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → shared gate/registry/signal → bind ports → spawn accept loops
//!
//! Shutdown (shutdown.rs):
//!     Signal → stop accepting → join listeners → drain registry → wait for handlers
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT/SIGQUIT → one stop notification
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Draining is bounded by a timeout

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ShutdownCoordinator, ShutdownReport, ShutdownSignal};
pub use signals::wait_for_shutdown_signal;
pub use startup::{Decoy, RunningDecoy, StartupError};
