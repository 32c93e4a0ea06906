//! Per-run execution context derivation.

use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

/// Cancellable, optionally deadline-bearing context for one task run.
///
/// With a timeout, a child token of the root is created together with a
/// deadline watcher; dropping the `RunContext` cancels the child on every
/// exit path of the owning run, which also stops the watcher. Without a
/// timeout the shared root token is used directly and dropping the
/// context has no effect on it.
pub struct RunContext {
    token: CancellationToken,
    _guard: Option<DropGuard>,
}

impl RunContext {
    pub fn build(root: &CancellationToken, timeout: Option<Duration>) -> Self {
        let timeout = match timeout.filter(|t| !t.is_zero()) {
            Some(t) => t,
            None => {
                return Self {
                    token: root.clone(),
                    _guard: None,
                }
            }
        };

        let child = root.child_token();
        let watcher = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    debug!("run deadline exceeded");
                    watcher.cancel();
                }
                _ = watcher.cancelled() => {}
            }
        });

        Self {
            token: child.clone(),
            _guard: Some(child.drop_guard()),
        }
    }

    /// The run's cancellation token, handed to the executor.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_timeout_reuses_root() {
        let root = CancellationToken::new();
        let ctx = RunContext::build(&root, None);
        assert!(!ctx.token().is_cancelled());

        root.cancel();
        assert!(ctx.token().is_cancelled());
    }

    #[tokio::test]
    async fn zero_timeout_means_no_deadline() {
        let root = CancellationToken::new();
        let ctx = RunContext::build(&root, Some(Duration::ZERO));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ctx.token().is_cancelled());
        // Dropping must not cancel the shared root.
        drop(ctx);
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn deadline_cancels_at_timeout() {
        let root = CancellationToken::new();
        let ctx = RunContext::build(&root, Some(Duration::from_millis(50)));
        let token = ctx.token();

        assert!(!token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("deadline should cancel the run context");
        assert!(!root.is_cancelled());
    }

    #[tokio::test]
    async fn root_cancellation_propagates_to_derived() {
        let root = CancellationToken::new();
        let ctx = RunContext::build(&root, Some(Duration::from_secs(60)));
        let token = ctx.token();

        root.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("root cancellation should propagate");
    }

    #[tokio::test]
    async fn drop_cancels_derived_context() {
        let root = CancellationToken::new();
        let ctx = RunContext::build(&root, Some(Duration::from_secs(60)));
        let token = ctx.token();

        drop(ctx);
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("drop should cancel the derived context");
        assert!(!root.is_cancelled());
    }
}
