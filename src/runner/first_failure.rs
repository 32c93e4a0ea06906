//! First-failure aggregation across concurrent runs.

use super::execute::TaskFailed;
use std::sync::Arc;
use std::sync::OnceLock;

/// Single first-error slot shared by all concurrent task runs.
///
/// Once set, later failures do not overwrite it; they are still logged
/// independently by the execute wrapper. The slot is a single-assignment
/// cell, so concurrent completions cannot race on the first write.
#[derive(Debug, Clone, Default)]
pub struct FirstFailure {
    slot: Arc<OnceLock<TaskFailed>>,
}

impl FirstFailure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, failure: TaskFailed) {
        let _ = self.slot.set(failure);
    }

    /// The aggregated command result: `Err` if any run ever failed.
    pub fn result(&self) -> Result<(), TaskFailed> {
        match self.slot.get() {
            Some(failure) => Err(*failure),
            None => Ok(()),
        }
    }
}
