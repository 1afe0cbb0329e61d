//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → loader.rs (optional TOML file)
//!     → command line overrides (cli.rs)
//!     → validation.rs (port filtering, banner resolution, range checks)
//!     → ValidatedConfig (immutable, owned by the Decoy)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once validated
//! - All fields have defaults to allow minimal configs
//! - Invalid ports are warnings; only an empty port set is fatal

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{DecoyConfig, ListenerConfig, LogFormat, PortEntry};
pub use validation::{validate_config, validate_ports, PortSelection, ValidatedConfig};
