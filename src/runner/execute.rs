//! Execution of a single task firing.

use super::run_context::RunContext;
use super::RunnerContext;
use super::TaskDefinition;
use crate::executor::ExecOptions;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn, Instrument};

/// Uniform task-failure signal.
///
/// The underlying cause is logged at the point of failure and not
/// propagated past this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task execution failed")]
pub struct TaskFailed;

/// Run one task to completion and normalize its outcome.
///
/// Builds the run context (applying the task's timeout to the shared root
/// token), invokes the executor inside its own spawned task so that a
/// panicking executor is absorbed as a task failure instead of tearing
/// down the process, and releases the derived context on every exit path.
pub async fn run_task(task: &Arc<TaskDefinition>, ctx: &RunnerContext) -> Result<(), TaskFailed> {
    debug!(task = %task.name, "starting task");

    let run = RunContext::build(&ctx.root, task.timeout);
    let opts = ExecOptions {
        ctx: run.token(),
        client: Arc::clone(&ctx.client),
        gate: Arc::clone(&ctx.gate),
        dry_run: ctx.dry_run,
    };

    let executor = Arc::clone(&ctx.executor);
    let script = task.script.clone();
    let span = tracing::info_span!("task", name = %task.name);
    let handle = tokio::spawn(
        async move { executor.run(&script, opts).await }.instrument(span),
    );

    match handle.await {
        Ok(Ok(())) => {
            debug!(task = %task.name, "finished task");
            Ok(())
        }
        Ok(Err(e)) => {
            warn!(task = %task.name, error = %e, "error running task");
            Err(TaskFailed)
        }
        Err(e) => {
            warn!(task = %task.name, error = %e, "task executor panicked");
            Err(TaskFailed)
        }
    }
    // `run` drops here: a derived deadline context is cancelled regardless
    // of how the executor returned.
}
