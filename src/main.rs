use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use taskbot::client::ServiceClient;
use taskbot::config::Config;
use taskbot::executor::ShellExecutor;
use taskbot::runner::{run_once, ConcurrencyGate, RunnerContext, Scheduler};

#[derive(Parser, Debug)]
#[command(name = "taskbot", about = "Utility for automating remote service actions")]
struct Cli {
    /// Path to TOML configuration file, or `-` to read it from stdin.
    #[arg(short = 'c', long, global = true)]
    config: Option<String>,

    /// Dry run, skip all external actions.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'v', long, global = true, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the taskbot server, firing tasks on their schedule until
    /// interrupted.
    Server,
    /// Run each task once, ignoring any scheduling. Returns after the
    /// last task completes.
    Once,
    /// Show the version.
    Version {
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level: LevelFilter = cli
        .verbosity
        .parse()
        .map_err(|_| anyhow!("invalid verbosity level: {:?}", cli.verbosity))?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    match cli.command {
        Command::Server => run_server(&cli).await,
        Command::Once => run_once_command(&cli).await,
        Command::Version { json } => run_version(json),
    }
}

/// Load configuration and assemble the shared execution dependencies.
fn build_context(cli: &Cli) -> Result<(Config, RunnerContext)> {
    let arg = cli
        .config
        .as_deref()
        .ok_or_else(|| anyhow!("a config file is required, use --config"))?;
    let config = Config::load(arg)?;

    debug!(
        parallel = config.defaults.parallel,
        "configuring parallel settings"
    );
    let gate = Arc::new(ConcurrencyGate::new(config.defaults.parallel));
    let client = Arc::new(ServiceClient::new(
        &config.hosts,
        !config.defaults.skip_docker_creds,
    )?);

    let ctx = RunnerContext {
        root: CancellationToken::new(),
        gate,
        client,
        executor: Arc::new(ShellExecutor::new()),
        dry_run: cli.dry_run,
    };
    Ok((config, ctx))
}

/// Cancel the root token on SIGINT/SIGTERM.
fn spawn_signal_listener(root: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("interrupt received, stopping");
        root.cancel();
    });
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install signal handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn run_server(cli: &Cli) -> Result<()> {
    let (config, ctx) = build_context(cli)?;
    spawn_signal_listener(ctx.root.clone());

    let scheduler = Scheduler::new(ctx, &config.tasks);
    info!(tasks = scheduler.scheduled_count(), "server started");
    scheduler.run().await?;
    Ok(())
}

async fn run_once_command(cli: &Cli) -> Result<()> {
    let (config, ctx) = build_context(cli)?;
    spawn_signal_listener(ctx.root.clone());

    run_once(ctx, &config.tasks).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    commit: &'static str,
}

fn run_version(json: bool) -> Result<()> {
    let version = VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("TASKBOT_BUILD_REF").unwrap_or("unknown"),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&version)?);
    } else {
        println!("{} {} ({})", version.name, version.version, version.commit);
    }
    Ok(())
}
