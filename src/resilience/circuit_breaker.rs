//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: one probe request tests whether the backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call attempted after recovery_timeout
//! Half-Open → Closed: probe request succeeds
//! Half-Open → Open: probe request fails
//! ```
//!
//! # Locking
//! Only the accounting before and after the wrapped operation runs under the
//! breaker's mutex. The operation itself is awaited with the lock released,
//! so a slow call never blocks state reads or other transitions.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::time::Instant;

use crate::error::RequestError;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Runtime breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures while closed before the circuit opens.
    pub failure_threshold: u32,
    /// Time an open circuit waits before admitting a probe.
    pub recovery_timeout: Duration,
    /// Deadline applied to every wrapped operation.
    pub call_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Read-only view of a breaker for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    /// Wall-clock time of the last failure, in milliseconds since the epoch.
    pub last_failure_time: Option<u64>,
    /// Remaining wait before an open circuit admits a probe.
    pub time_until_retry_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_wall: Option<SystemTime>,
    probe_in_flight: bool,
}

/// Per-backend circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    backend: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

/// How a call was let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe,
}

/// Clears the half-open probe slot if the call future is dropped before
/// its outcome is accounted.
struct ProbeSlot<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    /// Create a closed breaker for `backend`.
    pub fn new(backend: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            backend: backend.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_wall: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute `operation` through the breaker using the configured call timeout.
    pub async fn call<Fut, T, E>(&self, operation: Fut) -> Result<T, RequestError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with_timeout(self.config.call_timeout, operation).await
    }

    /// Execute `operation` through the breaker with an explicit timeout.
    ///
    /// Fails fast with [`RequestError::CircuitOpen`] without polling the
    /// operation when the circuit is open. A timeout counts as a failure.
    pub async fn call_with_timeout<Fut, T, E>(
        &self,
        timeout: Duration,
        operation: Fut,
    ) -> Result<T, RequestError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit(Instant::now())?;
        let mut slot = ProbeSlot {
            breaker: self,
            armed: admission == Admission::Probe,
        };

        let result = match tokio::time::timeout(timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RequestError::Operation(e)),
            Err(_) => Err(RequestError::Timeout {
                backend: self.backend.clone(),
                timeout,
            }),
        };

        if result.is_ok() {
            self.on_success(admission);
        } else {
            self.on_failure(admission, Instant::now());
        }
        slot.armed = false;
        result
    }

    fn admit<E>(&self, now: Instant) -> Result<Admission, RequestError<E>> {
        let mut inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(self.config.recovery_timeout);
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    drop(inner);
                    self.log_transition(CircuitState::Open, CircuitState::HalfOpen);
                    Ok(Admission::Probe)
                } else {
                    metrics::record_circuit_rejection(&self.backend);
                    Err(RequestError::CircuitOpen {
                        backend: self.backend.clone(),
                        retry_after: self.config.recovery_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    metrics::record_circuit_rejection(&self.backend);
                    Err(RequestError::CircuitOpen {
                        backend: self.backend.clone(),
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (inner.state, admission) {
            (CircuitState::Closed, _) => inner.failure_count = 0,
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                inner.last_failure = None;
                inner.last_failure_wall = None;
                inner.probe_in_flight = false;
                drop(inner);
                self.log_transition(CircuitState::HalfOpen, CircuitState::Closed);
            }
            // Late completions of calls admitted before the circuit opened
            // do not drive it out of Open.
            _ => {}
        }
    }

    fn on_failure(&self, admission: Admission, now: Instant) {
        let mut inner = self.lock();
        match (inner.state, admission) {
            (CircuitState::Closed, _) => {
                inner.failure_count += 1;
                inner.last_failure = Some(now);
                inner.last_failure_wall = Some(SystemTime::now());
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    let failures = inner.failure_count;
                    drop(inner);
                    tracing::warn!(
                        backend = %self.backend,
                        failures,
                        recovery_timeout = ?self.config.recovery_timeout,
                        "Circuit opened"
                    );
                    self.log_transition(CircuitState::Closed, CircuitState::Open);
                }
            }
            (CircuitState::HalfOpen, Admission::Probe) => {
                inner.state = CircuitState::Open;
                inner.failure_count += 1;
                inner.last_failure = Some(now);
                inner.last_failure_wall = Some(SystemTime::now());
                inner.probe_in_flight = false;
                drop(inner);
                self.log_transition(CircuitState::HalfOpen, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState) {
        tracing::info!(
            backend = %self.backend,
            from = from.as_str(),
            to = to.as_str(),
            "Circuit state transition"
        );
        metrics::record_circuit_transition(&self.backend, to);
    }

    /// Current state, without triggering any transition.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// True unless the circuit is open and still inside its recovery window.
    ///
    /// An open circuit whose recovery timeout has elapsed admits the next
    /// call as a probe, so it is reported as available for selection.
    pub fn allows_requests(&self) -> bool {
        let inner = self.lock();
        let state = inner.state;
        match state {
            CircuitState::Open => inner
                .last_failure
                .map(|t| t.elapsed() >= self.config.recovery_timeout)
                .unwrap_or(true),
            _ => true,
        }
    }

    /// Observability snapshot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let time_until_retry_ms = match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(t)) => Some(
                self.config
                    .recovery_timeout
                    .saturating_sub(t.elapsed())
                    .as_millis() as u64,
            ),
            _ => None,
        };
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_wall.map(|t| {
                t.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
            }),
            time_until_retry_ms,
        }
    }
}
