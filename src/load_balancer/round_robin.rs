//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SelectionError;
use crate::load_balancer::{backend::Backend, Algorithm, SelectionContext, SelectionStrategy};

/// Round-robin selector.
/// Stores an internal counter to rotate through the eligible set.
///
/// The eligible set is re-read on every call, so under concurrent membership
/// changes the rotation position is approximate.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectionStrategy for RoundRobin {
    fn select<'a>(
        &self,
        eligible: &'a [Backend],
        _context: &SelectionContext,
    ) -> Result<&'a Backend, SelectionError> {
        if eligible.is_empty() {
            return Err(SelectionError::NoEligibleBackend);
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % eligible.len();
        Ok(&eligible[index])
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::RoundRobin
    }
}
