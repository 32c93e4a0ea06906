//! Task scheduling and execution core.
//!
//! One execution unit per task firing, coordinated by a shared
//! cancellation token tree and a task tracker for drain-on-shutdown.
//! The scheduler decides *when* a task fires; the execute wrapper runs
//! exactly one firing and normalizes its outcome; the concurrency gate
//! bounds shared resource pressure across all simultaneous runs.

mod execute;
mod first_failure;
mod gate;
mod run_context;
mod scheduler;
mod task;

pub use execute::{run_task, TaskFailed};
pub use first_failure::FirstFailure;
pub use gate::{ConcurrencyGate, GateError, GatePermit};
pub use run_context::RunContext;
pub use scheduler::{run_once, Scheduler};
pub use task::{TaskDefinition, Trigger};

use crate::client::ServiceClient;
use crate::executor::ScriptExecutor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared dependencies for task execution.
///
/// Constructed once per command and cloned into every run; cancelling
/// `root` propagates to every in-flight and future run context.
#[derive(Clone)]
pub struct RunnerContext {
    /// Process-wide root cancellation token.
    pub root: CancellationToken,
    /// Shared concurrency gate, sized from configuration.
    pub gate: Arc<ConcurrencyGate>,
    /// Remote service client handle.
    pub client: Arc<ServiceClient>,
    /// The external executor that interprets script bodies.
    pub executor: Arc<dyn ScriptExecutor>,
    /// Skip all externally visible actions.
    pub dry_run: bool,
}
