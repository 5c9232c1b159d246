//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the balancer.
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so a minimal file only lists its backends.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::registry::HealthSettings;
use crate::load_balancer::{Algorithm, BalancerOptions};
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::scaling::ScalingRule;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BalancerConfig {
    /// Selection algorithm and health-check cadence.
    pub routing: RoutingConfig,

    /// Health registry thresholds.
    pub health: HealthConfig,

    /// Per-backend circuit breaker settings.
    pub circuit_breaker: CircuitBreakerSettings,

    /// Backends registered at startup.
    pub backends: Vec<BackendConfig>,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Admin HTTP API.
    pub admin: AdminConfig,

    /// Scaling rule engine.
    pub scaling: ScalingConfig,
}

impl BalancerConfig {
    /// Balancer options derived from this config.
    pub fn balancer_options(&self) -> BalancerOptions {
        BalancerOptions {
            algorithm: self.routing.algorithm,
            health_check_interval: Duration::from_secs(self.routing.health_check_interval_secs),
            probe_timeout: Duration::from_secs(self.health.probe_timeout_secs),
            circuit_breaker: self.circuit_breaker.to_breaker_config(),
        }
    }

    /// Registry thresholds derived from this config.
    pub fn health_settings(&self) -> HealthSettings {
        HealthSettings {
            failure_threshold: self.health.failure_threshold,
            recovery_threshold: self.health.recovery_threshold,
            latency_window: self.health.latency_window,
        }
    }
}

/// Routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RoutingConfig {
    /// Selection algorithm, fixed for the balancer's lifetime.
    pub algorithm: Algorithm,

    /// Interval between score recomputations, in seconds.
    pub health_check_interval_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            health_check_interval_secs: 30,
        }
    }
}

/// Health registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Number of consecutive failures before marking unhealthy.
    pub failure_threshold: u32,

    /// Number of consecutive successes before marking healthy.
    pub recovery_threshold: u32,

    /// Latency samples kept per backend.
    pub latency_window: usize,

    /// Timeout for an active probe, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_threshold: 2,
            latency_window: 100,
            probe_timeout_secs: 5,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting a probe.
    pub recovery_timeout_secs: u64,

    /// Deadline for each wrapped call, in seconds.
    pub call_timeout_secs: u64,
}

impl CircuitBreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
            call_timeout_secs: 30,
        }
    }
}

/// Backend definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub id: String,

    /// Weight for weighted load balancing (default: 1.0).
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// URL probed while the backend is unhealthy.
    #[serde(default)]
    pub health_url: Option<String>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default level for this crate's events when `RUST_LOG` is unset.
    pub log_level: String,

    pub log_format: LogFormat,

    /// Serve Prometheus metrics.
    pub metrics_enabled: bool,

    /// Prometheus listener address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    pub bind_address: String,

    /// Bearer token required on every admin route.
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: "admin-secret-key".to_string(),
        }
    }
}

/// Scaling engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    pub enabled: bool,

    /// Seconds between stats polls.
    pub interval_secs: u64,

    pub rules: Vec<ScalingRule>,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 15,
            rules: Vec::new(),
        }
    }
}
