//! Error taxonomy for the balancer.
//!
//! Every error is local and synchronous: it is returned from the call that
//! caused it. Backend failures are scoped to that backend's breaker and
//! health state and never poison the balancer itself.

use std::time::Duration;
use thiserror::Error;

/// Errors from registration and backend selection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BalancerError {
    /// A backend with this id is already registered.
    #[error("backend `{0}` is already registered")]
    DuplicateBackend(String),

    /// No backend with this id is registered.
    #[error("backend `{0}` is not registered")]
    UnknownBackend(String),

    /// No backend is both healthy and outside an open circuit.
    #[error("no healthy backend available ({registered} registered)")]
    NoHealthyBackend { registered: usize },

    /// Weights must be finite, strictly positive and at most `MAX_WEIGHT`.
    #[error("backend `{id}` has invalid weight {weight}")]
    InvalidWeight { id: String, weight: f64 },
}

/// Returned by a selection strategy handed an empty eligible set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no eligible backend")]
    NoEligibleBackend,
}

/// Errors from executing work against a backend.
///
/// `E` is the error type of the wrapped operation; it is handed back
/// unchanged in [`RequestError::Operation`] once accounting has finished.
#[derive(Debug, Error)]
pub enum RequestError<E> {
    /// The backend was unregistered (or never existed).
    #[error("backend `{0}` is not registered")]
    UnknownBackend(String),

    /// The backend's circuit is open; pick a different backend.
    #[error("circuit open for backend `{backend}`, retry in {retry_after:?}")]
    CircuitOpen { backend: String, retry_after: Duration },

    /// The operation exceeded the breaker's call timeout.
    #[error("operation on backend `{backend}` timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    /// The operation itself failed.
    #[error("operation failed: {0}")]
    Operation(E),
}

impl<E> RequestError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, RequestError::CircuitOpen { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// Extract the wrapped operation's own error, if that is what failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RequestError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SelectionError> for BalancerError {
    fn from(_: SelectionError) -> Self {
        BalancerError::NoHealthyBackend { registered: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_predicates() {
        let open: RequestError<std::io::Error> = RequestError::CircuitOpen {
            backend: "a".into(),
            retry_after: Duration::from_secs(1),
        };
        assert!(open.is_circuit_open());
        assert!(!open.is_timeout());
        assert!(open.into_operation().is_none());

        let op: RequestError<&str> = RequestError::Operation("boom");
        assert_eq!(op.to_string(), "operation failed: boom");
        assert_eq!(op.into_operation(), Some("boom"));
    }
}
