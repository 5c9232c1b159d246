//! Least Connections load balancing strategy.

use crate::error::SelectionError;
use crate::load_balancer::{backend::Backend, Algorithm, SelectionContext, SelectionStrategy};

/// Least connections selector.
/// Selects the backend with the minimum number of in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionStrategy for LeastConnections {
    fn select<'a>(
        &self,
        eligible: &'a [Backend],
        _context: &SelectionContext,
    ) -> Result<&'a Backend, SelectionError> {
        // min_by_key keeps the first of equal minima.
        eligible
            .iter()
            .min_by_key(|b| b.current_connections)
            .ok_or(SelectionError::NoEligibleBackend)
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::LeastConnections
    }
}
