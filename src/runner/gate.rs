//! Process-wide weighted concurrency gate.

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GateError {
    #[error("gate acquisition cancelled")]
    Cancelled,
}

/// Weighted counting limiter shared by every task execution.
///
/// The gate bounds total concurrent gated operations process-wide, not
/// the number of running tasks: a single task may hold many permits.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire `weight` units, blocking until capacity is available.
    ///
    /// An acquire blocked past the context's cancellation fails with
    /// [`GateError::Cancelled`] rather than blocking forever.
    pub async fn acquire(
        &self,
        weight: u32,
        ctx: &CancellationToken,
    ) -> Result<GatePermit, GateError> {
        tokio::select! {
            permit = self.semaphore.clone().acquire_many_owned(weight) => {
                trace!(weight, "gate slot acquired");
                Ok(GatePermit {
                    _permit: permit.expect("gate semaphore closed"),
                })
            }
            _ = ctx.cancelled() => Err(GateError::Cancelled),
        }
    }
}

/// A permit that releases its gate capacity when dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}
