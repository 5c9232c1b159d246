//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! balancer.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BalancerConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs reloads and validates
//!     → reconcile_backends registers/unregisters the difference
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BackendConfig, BalancerConfig};
pub use watcher::{reconcile_backends, ConfigWatcher};
