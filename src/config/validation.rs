//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and backend
//! uniqueness. Every problem is reported, not just the first.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::BalancerConfig;
use crate::load_balancer::backend::MAX_WEIGHT;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &BalancerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routing.health_check_interval_secs == 0 {
        errors.push(ValidationError::new(
            "routing.health_check_interval_secs",
            "must be greater than 0",
        ));
    }

    if config.health.failure_threshold == 0 {
        errors.push(ValidationError::new("health.failure_threshold", "must be at least 1"));
    }
    if config.health.recovery_threshold == 0 {
        errors.push(ValidationError::new("health.recovery_threshold", "must be at least 1"));
    }
    if config.health.latency_window == 0 {
        errors.push(ValidationError::new("health.latency_window", "must be at least 1"));
    }
    if config.health.probe_timeout_secs == 0 {
        errors.push(ValidationError::new("health.probe_timeout_secs", "must be greater than 0"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if cb.call_timeout_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.call_timeout_secs", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        if backend.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("backends[{i}].id"), "must not be empty"));
        } else if !seen.insert(backend.id.as_str()) {
            errors.push(ValidationError::new(
                format!("backends[{i}].id"),
                format!("duplicate backend '{}'", backend.id),
            ));
        }
        if !backend.weight.is_finite() || backend.weight <= 0.0 || backend.weight > MAX_WEIGHT {
            errors.push(ValidationError::new(
                format!("backends[{i}].weight"),
                format!(
                    "must be a positive number no greater than {MAX_WEIGHT}, got {}",
                    backend.weight
                ),
            ));
        }
        if let Some(url) = &backend.health_url {
            if reqwest::Url::parse(url).is_err() {
                errors.push(ValidationError::new(
                    format!("backends[{i}].health_url"),
                    format!("invalid URL '{url}'"),
                ));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "must be a socket address"));
        }
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.scaling.enabled && config.scaling.interval_secs == 0 {
        errors.push(ValidationError::new("scaling.interval_secs", "must be greater than 0"));
    }
    let mut rule_names = HashSet::new();
    for (i, rule) in config.scaling.rules.iter().enumerate() {
        if !rule_names.insert(rule.name.as_str()) {
            errors.push(ValidationError::new(
                format!("scaling.rules[{i}].name"),
                format!("duplicate rule '{}'", rule.name),
            ));
        }
        if let Err(message) = rule.condition.validate() {
            errors.push(ValidationError::new(format!("scaling.rules[{i}].condition"), message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
