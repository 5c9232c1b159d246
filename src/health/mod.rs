//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Passive (registry.rs):
//!     Request outcome recorded
//!     → update totals, latency window, consecutive counters
//!     → flip healthy/unhealthy when a threshold is crossed
//!
//! Periodic (monitor.rs):
//!     Timer tick
//!     → recompute load/quality scores
//!     → probe unhealthy backends (probe.rs), feed results back
//! ```
//!
//! # Design Decisions
//! - Health reflects sustained degradation; the circuit breaker reflects
//!   bursts. The two are tracked independently and combined with AND.
//! - State transitions require consecutive successes/failures (hysteresis)
//! - The registry is the single source of truth and is injected, not global

pub mod monitor;
pub mod probe;
pub mod registry;

pub use monitor::HealthMonitor;
pub use probe::{HealthProbe, HttpProbe};
pub use registry::{BackendHealthRegistry, ConnectionGuard, HealthSettings, HealthTransition};
