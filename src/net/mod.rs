//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → admission.rs (global concurrency cap, acquired before accept)
//!     → listener.rs (per-port accept loop)
//!     → registry.rs (register; drained on shutdown)
//!     → connection.rs (banner, one read, log, cleanup)
//!
//! Listener States:
//!     Created → Listening → Stopping → Stopped
//! ```
//!
//! # Design Decisions
//! - Tokens are acquired before accept so excess peers wait in the kernel backlog
//! - Each connection owns a slot whose drop unregisters, then releases
//! - Every blocking call selects on the shutdown signal or a drain token

pub mod admission;
pub mod connection;
pub mod listener;
pub mod registry;

pub use admission::{AdmissionGate, AdmissionToken};
pub use connection::{Banners, ConnectionRecord, HandlerConfig, Outcome};
pub use listener::{AcceptContext, ListenerError, ListenerState, ListenerStats, PortListener};
pub use registry::{ConnectionId, ConnectionRegistry, ConnectionSlot};
