//! Adaptive load balancer for pools of agent backends.
//!
//! # Architecture Overview
//!
//! ```text
//! select_backend(ctx)
//!     → health::BackendHealthRegistry snapshot
//!     → keep healthy backends whose circuit admits requests
//!     → load_balancer strategy picks one
//!
//! execute_request(id, op)
//!     → resilience::CircuitBreaker (admit / probe / reject, call timeout)
//!     → outcome and latency recorded in the registry
//!
//! health loop (health::HealthMonitor)
//!     → recompute load and quality scores, probe unhealthy backends
//!
//! get_stats()
//!     → scaling::ScalingRuleEngine → scale up / scale down / failover
//!     → admin API and balancer-cli
//! ```

// Core
pub mod error;
pub mod health;
pub mod load_balancer;
pub mod resilience;

// Consumers of balancer stats
pub mod admin;
pub mod scaling;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::BalancerConfig;
pub use error::{BalancerError, RequestError, SelectionError};
pub use health::{BackendHealthRegistry, HealthSettings};
pub use lifecycle::Shutdown;
pub use load_balancer::{
    Algorithm, BalancerOptions, LoadBalancer, LoadBalancerStats, Priority, SelectionContext,
};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use scaling::{ScalingAction, ScalingCondition, ScalingDecision, ScalingRule, ScalingRuleEngine};
