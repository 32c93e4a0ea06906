//! Continuous-mode scheduling and the run-once driver.

use super::execute::{run_task, TaskFailed};
use super::first_failure::FirstFailure;
use super::task::{TaskDefinition, Trigger};
use super::RunnerContext;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Upper bound on how long the trigger loop sleeps between checks.
const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);

struct Entry {
    task: Arc<TaskDefinition>,
    trigger: Trigger,
    /// `None` once the trigger can never fire again.
    next_fire: Option<DateTime<Utc>>,
    /// Per-task skip-if-still-running guard.
    running: Arc<AtomicBool>,
}

/// Continuous-mode triggering engine.
///
/// Each schedulable task fires on its own trigger; a firing while the
/// previous run of the same task is still executing is dropped, not
/// queued. Cancelling the context's root token stops all future firings
/// and `run` returns once every in-flight execution has completed.
pub struct Scheduler {
    ctx: RunnerContext,
    entries: Vec<Entry>,
    tracker: TaskTracker,
    failures: FirstFailure,
}

impl Scheduler {
    /// Register every schedulable task. Tasks with neither a schedule nor
    /// an interval are logged and permanently excluded; this does not
    /// abort startup.
    pub fn new(ctx: RunnerContext, tasks: &[Arc<TaskDefinition>]) -> Self {
        let now = Utc::now();
        let mut entries = Vec::new();
        for task in tasks {
            let trigger = match task.trigger() {
                Ok(Some(trigger)) => trigger,
                Ok(None) => {
                    error!(task = %task.name, "no schedule or interval found, ignoring");
                    continue;
                }
                Err(e) => {
                    // Config validation rejects these up front; a stray
                    // bad expression is excluded the same way.
                    error!(task = %task.name, error = %e, "invalid schedule, ignoring");
                    continue;
                }
            };
            debug!(task = %task.name, trigger = %trigger, "scheduled task");
            entries.push(Entry {
                task: Arc::clone(task),
                next_fire: trigger.next_fire(now),
                trigger,
                running: Arc::new(AtomicBool::new(false)),
            });
        }

        Self {
            ctx,
            entries,
            tracker: TaskTracker::new(),
            failures: FirstFailure::new(),
        }
    }

    /// Number of tasks registered with the triggering engine.
    pub fn scheduled_count(&self) -> usize {
        self.entries.len()
    }

    /// Run the triggering loop until the root token is cancelled, then
    /// drain in-flight executions and return the aggregated result.
    pub async fn run(mut self) -> Result<(), TaskFailed> {
        debug!(tasks = self.entries.len(), "starting scheduler");

        loop {
            let sleep_duration = self.time_until_next_fire();
            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => self.fire_due(),
                _ = self.ctx.root.cancelled() => break,
            }
        }

        // No new firings past this point; wait for in-flight runs.
        self.tracker.close();
        debug!("waiting on running tasks");
        self.tracker.wait().await;
        debug!("scheduler drained");

        self.failures.result()
    }

    fn time_until_next_fire(&self) -> Duration {
        let now = Utc::now();
        let mut min_duration = MAX_IDLE_SLEEP;
        for entry in &self.entries {
            // Running tasks are not skipped here: their triggers still
            // fire and are dropped by the guard in `fire_due`.
            if let Some(next_fire) = entry.next_fire {
                if next_fire <= now {
                    return Duration::ZERO;
                }
                let duration = (next_fire - now).to_std().unwrap_or(Duration::ZERO);
                if duration < min_duration {
                    min_duration = duration;
                }
            }
        }
        min_duration
    }

    /// Fire every due task. Missed firings are dropped: the next fire is
    /// always computed from now, and a task whose previous run is still
    /// active skips the trigger entirely.
    fn fire_due(&mut self) {
        let now = Utc::now();
        for entry in &mut self.entries {
            match entry.next_fire {
                Some(next_fire) if next_fire <= now => {}
                _ => continue,
            }
            entry.next_fire = entry.trigger.next_fire(now);

            if entry
                .running
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                debug!(task = %entry.task.name, "previous run still active, skipping trigger");
                continue;
            }

            debug!(task = %entry.task.name, "running task");
            let task = Arc::clone(&entry.task);
            let running = Arc::clone(&entry.running);
            let ctx = self.ctx.clone();
            let failures = self.failures.clone();
            self.tracker.spawn(async move {
                if let Err(failure) = run_task(&task, &ctx).await {
                    failures.record(failure);
                }
                running.store(false, Ordering::SeqCst);
            });
        }
    }
}

/// Run every task exactly once, immediately and concurrently, ignoring
/// schedules. Returns after the last execution completes, with the first
/// failure observed across all of them.
pub async fn run_once(
    ctx: RunnerContext,
    tasks: &[Arc<TaskDefinition>],
) -> Result<(), TaskFailed> {
    let tracker = TaskTracker::new();
    let failures = FirstFailure::new();

    for task in tasks {
        debug!(task = %task.name, "running task");
        let task = Arc::clone(task);
        let ctx = ctx.clone();
        let failures = failures.clone();
        tracker.spawn(async move {
            if let Err(failure) = run_task(&task, &ctx).await {
                failures.record(failure);
            }
        });
    }

    tracker.close();
    tracker.wait().await;
    failures.result()
}
