//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! execute_request(backend, operation):
//!     → circuit_breaker.rs admits, probes, or rejects
//!     → operation runs under the breaker's call timeout
//!     → success/failure/timeout moves the breaker's state machine
//! ```
//!
//! # Design Decisions
//! - One breaker per backend; a failing backend never trips another
//! - Timeouts count as failures
//! - Nothing is retried here; callers select another backend instead

pub mod circuit_breaker;
