//! Static task definitions and trigger derivation.

use chrono::{DateTime, Utc};
use std::str::FromStr;
use std::time::Duration;

/// Immutable description of one task, loaded once per process lifetime.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Human-readable identifier. Uniqueness is a configuration-time
    /// concern and not enforced here.
    pub name: String,
    /// Cron expression, `cron` crate syntax (seconds field first).
    pub schedule: Option<String>,
    /// Fixed interval, used when `schedule` is absent.
    pub interval: Option<Duration>,
    /// Per-run deadline. `None` means no deadline.
    pub timeout: Option<Duration>,
    /// Opaque payload interpreted only by the executor.
    pub script: String,
}

/// Effective trigger for continuous-mode scheduling.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron(cron::Schedule),
    Every(Duration),
}

impl TaskDefinition {
    /// Derive the effective trigger: `schedule` wins over `interval`;
    /// a task with neither is unschedulable (`Ok(None)`) and only runs
    /// in run-once mode. An unparseable cron expression is an error.
    pub fn trigger(&self) -> Result<Option<Trigger>, cron::error::Error> {
        if let Some(expr) = &self.schedule {
            return Ok(Some(Trigger::Cron(cron::Schedule::from_str(expr)?)));
        }
        Ok(self.interval.map(Trigger::Every))
    }
}

impl Trigger {
    /// Next fire time strictly after `after`. `None` means the trigger
    /// will never fire again.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron(schedule) => schedule.after(&after).next(),
            Trigger::Every(interval) => chrono::Duration::from_std(*interval)
                .ok()
                .map(|interval| after + interval),
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Cron(schedule) => write!(f, "{}", schedule),
            Trigger::Every(interval) => write!(f, "every {:?}", interval),
        }
    }
}
