//! Taskbot Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod client;
pub mod config;
pub mod executor;
pub mod runner;

// Re-export commonly used types for convenience
pub use client::ServiceClient;
pub use config::Config;
pub use executor::{ExecError, ExecOptions, ScriptExecutor, ShellExecutor};
pub use runner::{
    run_once, ConcurrencyGate, RunnerContext, Scheduler, TaskDefinition, TaskFailed,
};
