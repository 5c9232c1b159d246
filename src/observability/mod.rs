//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! breaker transitions, health flips, selections, request outcomes
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Prometheus scrape endpoint (optional)
//! ```

pub mod logging;
pub mod metrics;
