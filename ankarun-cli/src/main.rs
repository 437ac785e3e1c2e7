//! ankarun - run a command inside an Anka VM from the shell.
//!
//! The process exits with the resolved status of the run.

mod cli;

use std::path::Path;

use ankarun::Runner;
use ankarun::constants::exit_codes;
use anyhow::Context;
use clap::Parser;
use cli::Cli;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE: &str = "ankarun.log";
const DEFAULT_LOG_FILTER: &str = "warn";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Scoped so the log writer flushes before the process exits.
    let code = {
        let _log_guard = match init_logging(cli.log_dir.as_deref()) {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(exit_codes::GENERIC_FAILURE);
            }
        };

        match execute(cli).await {
            Ok(code) => code,
            Err(e) => {
                tracing::error!("Run failed: {:#}", e);
                eprintln!("Error: {:#}", e);
                exit_codes::GENERIC_FAILURE
            }
        }
    };

    std::process::exit(code);
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let options = cli.runner_options()?;
    let params = cli.run_params();

    let cancel = CancellationToken::new();
    let mut runner = Runner::with_options(params, options).with_cancellation(cancel.clone());

    runner
        .start()
        .with_context(|| format!("Failed to run command in VM '{}'", cli.vm))?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping command");
            cancel.cancel();
        }
    });

    Ok(runner.exit_status().await)
}

/// Log to stderr, or to daily rotated files when a log directory is given.
///
/// The returned guard keeps the file writer alive.
fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .context("Failed to build log filter")?;

    let Some(log_dir) = log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
            .context("Failed to initialize logging")?;
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_ansi(false),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(Some(guard))
}
