//! authledger binary: schema setup, job runner, retention and queries over
//! the authentication event stores.
//!
//! `serve` runs the job runner and retention tasks until SIGTERM/SIGINT.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use authledger_jobs::{JobError, JobRunner};
use authledger_store::{enforce_data_retention_policy, StoreError};
use authledger_worker::accounting::{Accounting, AccountingError};
use authledger_worker::config::{self, Config, ConfigError};
use authledger_worker::{retention, runner};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "authledger", version, about = "Authentication event accounting")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "AUTHLEDGER_CONFIG_PATH", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create or migrate the schema of every configured store.
    Setup,
    /// Process queued jobs until the queue is empty or a pause threshold is hit.
    RunJobs,
    /// Delete data older than the configured retention.
    EnforceRetention,
    /// Run the job runner and retention tasks until interrupted.
    Serve,
    /// Record one authentication from a JSON state file.
    Record {
        /// File holding the state as JSON.
        state: PathBuf,
    },
    /// Move a failed job back to the queue.
    ReplayFailed {
        /// Id of the row in the failed jobs table.
        id: i64,
    },
    /// Print a user's recent authentications as JSON.
    Activity {
        user: String,
        #[arg(long, default_value_t = 20)]
        max_results: u32,
        #[arg(long, default_value_t = 0)]
        first_result: u32,
    },
    /// Print the service providers a user has authenticated to as JSON.
    ConnectedServices { user: String },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] authledger_db::PoolError),

    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("failed to read state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Usage(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match config::load_config(Some(&cli.config)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from {}: {e}", cli.config);
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(path = %cli.config, "resolved configuration path");

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: Config) -> Result<(), CliError> {
    let connections = config.database.connect()?;
    let accounting = Accounting::new(&config.accounting, connections);

    match command {
        Command::Setup => {
            if accounting.needs_setup()? {
                accounting.run_setup()?;
                tracing::info!("setup complete");
            } else {
                tracing::info!("schema is already current");
            }
        }
        Command::RunJobs => {
            let runner = job_runner(&config, &accounting)?;
            let summary = tokio::task::spawn_blocking(move || runner.run()).await??;
            tracing::info!(
                processed = summary.processed,
                failed = summary.failed,
                "job run finished"
            );
        }
        Command::EnforceRetention => {
            let Some(retention) = config.accounting.retention() else {
                tracing::warn!("accounting.retention_days is not set, nothing to enforce");
                return Ok(());
            };
            let trackers = accounting.trackers().to_vec();
            tokio::task::spawn_blocking(move || {
                enforce_data_retention_policy(&trackers, retention)
            })
            .await??;
        }
        Command::Serve => serve(&config, accounting).await?,
        Command::Record { state } => {
            let raw = std::fs::read_to_string(&state)?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            let outcome = tokio::task::spawn_blocking(move || accounting.handle(&value)).await??;
            tracing::info!(?outcome, "authentication handled");
        }
        Command::ReplayFailed { id } => {
            let store = accounting
                .jobs_store()
                .ok_or_else(|| CliError::Usage(asynchronous_only("replay-failed")))?;
            match store.replay_failed(id)? {
                Some(job_id) => tracing::info!(failed_id = id, job_id, "job requeued"),
                None => return Err(CliError::Usage(format!("no failed job with id {id}"))),
            }
        }
        Command::Activity {
            user,
            max_results,
            first_result,
        } => {
            let provider = accounting.provider();
            let activity = tokio::task::spawn_blocking(move || {
                provider.get_activity(&user, max_results, first_result)
            })
            .await??;
            println!("{}", serde_json::to_string_pretty(&activity)?);
        }
        Command::ConnectedServices { user } => {
            let provider = accounting.provider();
            let services =
                tokio::task::spawn_blocking(move || provider.get_connected_service_providers(&user))
                    .await??;
            println!("{}", serde_json::to_string_pretty(&services)?);
        }
    }

    Ok(())
}

fn asynchronous_only(command: &str) -> String {
    format!("{command} requires accounting.processing_type = \"asynchronous\"")
}

fn job_runner(config: &Config, accounting: &Accounting) -> Result<JobRunner, CliError> {
    let store = accounting
        .jobs_store()
        .cloned()
        .ok_or_else(|| CliError::Usage(asynchronous_only("the job runner")))?;

    Ok(JobRunner::new(
        store,
        accounting.processor_registry(),
        config.job_runner.limits(),
    ))
}

async fn serve(config: &Config, accounting: Accounting) -> Result<(), CliError> {
    if accounting.needs_setup()? {
        return Err(CliError::Usage(
            "schema is not set up, run `authledger setup` first".to_string(),
        ));
    }

    let runner_task = match accounting.jobs_store() {
        Some(_) => {
            let runner = Arc::new(job_runner(config, &accounting)?);
            let stop = runner.stop_handle();
            let handle = tokio::spawn(runner::start_job_runner_task(
                runner,
                config.job_runner.idle_sleep(),
            ));
            Some((stop, handle))
        }
        None => {
            tracing::info!("synchronous processing, job runner not started");
            None
        }
    };

    let retention_task = match config.accounting.retention() {
        Some(retention) => Some(tokio::spawn(retention::start_retention_task(
            accounting.trackers().to_vec(),
            retention,
            config.retention.interval_seconds,
        ))),
        None => {
            tracing::info!("accounting.retention_days not set, retention task not started");
            None
        }
    };

    shutdown_signal().await;

    if let Some(handle) = retention_task {
        handle.abort();
    }
    if let Some((stop, handle)) = runner_task {
        // Let the current job finish before exiting.
        stop.store(true, Ordering::Relaxed);
        handle.await?;
    }

    tracing::info!("authledger shut down");
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
