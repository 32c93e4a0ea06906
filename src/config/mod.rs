//! Configuration loading and validation.
//!
//! Configuration is a single TOML file: process-wide `[defaults]`, an
//! ordered list of `[[tasks]]`, and optional `[[hosts]]` credentials for
//! the service client. `--config -` reads the same TOML from stdin.

use crate::runner::TaskDefinition;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Raw configuration file contents, before validation.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub defaults: DefaultsConfig,
    pub tasks: Vec<TaskConfig>,
    pub hosts: Vec<HostConfig>,
}

/// Process-wide defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Capacity of the shared concurrency gate.
    pub parallel: usize,
    /// Skip loading ambient Docker-style credentials into the client.
    pub skip_docker_creds: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            parallel: 1,
            skip_docker_creds: false,
        }
    }
}

/// One task entry.
///
/// `schedule` is a cron expression in the `cron` crate's 6/7-field syntax
/// (seconds field first, e.g. `"0 0 * * * *"` for hourly). When absent,
/// `interval_secs` produces an "every N seconds" trigger instead. A task
/// with neither still runs in `once` mode but is excluded from `server`
/// mode scheduling.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TaskConfig {
    pub name: String,
    pub schedule: Option<String>,
    pub interval_secs: Option<u64>,
    /// Per-run deadline. Zero or absent means no deadline.
    pub timeout_secs: Option<u64>,
    pub script: String,
}

/// Credentials for one remote host.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct HostConfig {
    pub name: String,
    pub hostname: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub token: Option<String>,
    pub tls: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn load_reader(mut reader: impl Read) -> Result<Self> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .context("Failed to read config from input")?;
        toml::from_str(&content).context("Failed to parse config")
    }
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: DefaultsConfig,
    pub tasks: Vec<Arc<TaskDefinition>>,
    pub hosts: Vec<HostConfig>,
}

impl Config {
    /// Load and validate configuration from a path, or from stdin when the
    /// argument is `-`.
    pub fn load(arg: &str) -> Result<Self> {
        let file = if arg == "-" {
            FileConfig::load_reader(std::io::stdin())?
        } else {
            FileConfig::load(Path::new(arg))?
        };
        Self::resolve(file)
    }

    /// Validate a raw file config. Any error here is fatal to process start.
    pub fn resolve(file: FileConfig) -> Result<Self> {
        if file.defaults.parallel == 0 {
            bail!("defaults.parallel must be at least 1");
        }

        let mut tasks = Vec::with_capacity(file.tasks.len());
        for task in &file.tasks {
            if task.name.is_empty() {
                bail!("task with empty name in config");
            }
            if task.script.is_empty() {
                bail!("task {:?} has an empty script", task.name);
            }

            let def = TaskDefinition {
                name: task.name.clone(),
                schedule: task.schedule.clone(),
                // Zero intervals and timeouts are treated as absent.
                interval: task
                    .interval_secs
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs),
                timeout: task
                    .timeout_secs
                    .filter(|s| *s > 0)
                    .map(Duration::from_secs),
                script: task.script.clone(),
            };

            // Surface bad cron expressions at load time rather than at the
            // first firing.
            def.trigger()
                .with_context(|| format!("task {:?} has an invalid schedule", task.name))?;

            tasks.push(Arc::new(def));
        }

        for host in &file.hosts {
            if host.name.is_empty() {
                bail!("host entry with empty name in config");
            }
        }

        Ok(Self {
            defaults: file.defaults,
            tasks,
            hosts: file.hosts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(content: &str) -> Result<Config> {
        let file: FileConfig = toml::from_str(content)?;
        Config::resolve(file)
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.defaults.parallel, 1);
        assert!(!config.defaults.skip_docker_creds);
        assert!(config.tasks.is_empty());
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let config = parse(
            r#"
            [defaults]
            parallel = 4
            skip_docker_creds = true

            [[tasks]]
            name = "hourly-sync"
            schedule = "0 0 * * * *"
            timeout_secs = 300
            script = "sync --all"

            [[tasks]]
            name = "poller"
            interval_secs = 60
            script = "poll"

            [[hosts]]
            name = "registry.example.com"
            user = "bot"
            pass = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.defaults.parallel, 4);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].name, "hourly-sync");
        assert_eq!(config.tasks[0].timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.tasks[1].interval, Some(Duration::from_secs(60)));
        assert_eq!(config.hosts[0].name, "registry.example.com");
    }

    #[test]
    fn zero_parallel_rejected() {
        let err = parse("[defaults]\nparallel = 0").unwrap_err();
        assert!(err.to_string().contains("parallel"));
    }

    #[test]
    fn invalid_cron_rejected() {
        let err = parse(
            r#"
            [[tasks]]
            name = "broken"
            schedule = "not a cron"
            script = "noop"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn empty_task_name_rejected() {
        let err = parse(
            r#"
            [[tasks]]
            script = "noop"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn empty_script_rejected() {
        let err = parse(
            r#"
            [[tasks]]
            name = "no-body"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty script"));
    }

    #[test]
    fn zero_timeout_means_no_deadline() {
        let config = parse(
            r#"
            [[tasks]]
            name = "untimed"
            interval_secs = 10
            timeout_secs = 0
            script = "noop"
            "#,
        )
        .unwrap();
        assert_eq!(config.tasks[0].timeout, None);
    }

    #[test]
    fn zero_interval_treated_as_absent() {
        let config = parse(
            r#"
            [[tasks]]
            name = "dangling"
            interval_secs = 0
            script = "noop"
            "#,
        )
        .unwrap();
        assert_eq!(config.tasks[0].interval, None);
        assert!(config.tasks[0].trigger().unwrap().is_none());
    }

    #[test]
    fn load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[tasks]]
            name = "from-file"
            interval_secs = 5
            script = "noop"
            "#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].name, "from-file");
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(Config::load("/nonexistent/taskbot.toml").is_err());
    }
}
