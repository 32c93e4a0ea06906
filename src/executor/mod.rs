//! The executor boundary.
//!
//! `ScriptExecutor` is the seam to the external sandbox that actually
//! interprets a task's script body. The runner only cares that it respects
//! the run context's cancellation and reports success or failure; what the
//! script language is, and what a script does, are opaque from here.

use crate::client::ServiceClient;
use crate::runner::ConcurrencyGate;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Options assembled for one script execution.
///
/// The logger is not carried here: executions run inside a tracing span
/// attached by the runner, so the ambient subscriber is the log handle.
#[derive(Clone)]
pub struct ExecOptions {
    /// Cancellable, optionally deadline-bearing run context.
    pub ctx: CancellationToken,
    /// Handle to the remote service client.
    pub client: Arc<ServiceClient>,
    /// Shared gate bounding concurrent expensive operations.
    pub gate: Arc<ConcurrencyGate>,
    /// Skip all externally visible actions.
    pub dry_run: bool,
}

/// Errors surfaced by an executor. The runner collapses all of these into
/// a uniform task failure; the variants exist for logging.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("execution cancelled")]
    Cancelled,

    #[error("script exited with status {0}")]
    Exit(i32),

    #[error("failed to run script: {0}")]
    Io(#[from] std::io::Error),
}

/// External sandbox that runs one opaque script body.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn run(&self, script: &str, opts: ExecOptions) -> Result<(), ExecError>;
}

/// Default executor: runs the script body through `/bin/sh -c`.
///
/// The run context is exported to the child's environment
/// (`TASKBOT_DRY_RUN`), a gate permit is held for the duration of the
/// child process, and the child is killed when the run context is
/// cancelled.
#[derive(Debug, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScriptExecutor for ShellExecutor {
    async fn run(&self, script: &str, opts: ExecOptions) -> Result<(), ExecError> {
        let _permit = opts
            .gate
            .acquire(1, &opts.ctx)
            .await
            .map_err(|_| ExecError::Cancelled)?;
        if opts.ctx.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        trace!("spawning script shell");
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(script)
            .env("TASKBOT_DRY_RUN", if opts.dry_run { "1" } else { "0" })
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ExecError::Exit(status.code().unwrap_or(-1)))
                }
            }
            _ = opts.ctx.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(ExecError::Cancelled)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options(ctx: CancellationToken, dry_run: bool) -> ExecOptions {
        ExecOptions {
            ctx,
            client: Arc::new(ServiceClient::new(&[], false).unwrap()),
            gate: Arc::new(ConcurrencyGate::new(1)),
            dry_run,
        }
    }

    #[tokio::test]
    async fn successful_script() {
        let executor = ShellExecutor::new();
        let result = executor
            .run("true", options(CancellationToken::new(), false))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn failing_script_reports_exit_status() {
        let executor = ShellExecutor::new();
        let result = executor
            .run("exit 3", options(CancellationToken::new(), false))
            .await;
        match result {
            Err(ExecError::Exit(3)) => {}
            other => panic!("expected exit status 3, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn cancellation_kills_script() {
        let executor = ShellExecutor::new();
        let token = CancellationToken::new();
        let opts = options(token.clone(), false);

        let handle = tokio::spawn(async move { executor.run("sleep 30", opts).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("executor did not observe cancellation")
            .unwrap();
        assert!(matches!(result, Err(ExecError::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_context_fails_before_spawn() {
        let executor = ShellExecutor::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = executor.run("true", options(token, false)).await;
        assert!(matches!(result, Err(ExecError::Cancelled)));
    }

    #[tokio::test]
    async fn dry_run_exported_to_environment() {
        let executor = ShellExecutor::new();
        let result = executor
            .run(
                r#"test "$TASKBOT_DRY_RUN" = 1"#,
                options(CancellationToken::new(), true),
            )
            .await;
        assert!(result.is_ok());
    }
}
