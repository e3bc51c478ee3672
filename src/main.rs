//! bookfusion-sync
//!
//! Sends Calibre books tagged with the sync marker to BookFusion.
//!
//! # Usage
//!
//! - `bookfusion-sync` - apply the persisted mode and keep running until Ctrl-C
//! - `bookfusion-sync --once [--force]` - one manual run, JSON report on stdout
//! - `bookfusion-sync --mode automatic` - persist a mode, then keep running
//! - `bookfusion-sync --status` - JSON status and recent runs on stdout

use anyhow::Context;
use clap::Parser;
use core_runtime::{logging::init_logging, AppConfig, SyncMode};
use core_sync::RunError;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

/// How long an in-flight run may take to wind down after Ctrl-C
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Calibre to BookFusion sync.
#[derive(Parser)]
#[command(name = "bookfusion-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Perform a single manual run and print its report
    #[arg(long)]
    once: bool,

    /// Re-upload books even when their content is unchanged
    #[arg(long, requires = "once")]
    force: bool,

    /// Persist the sync mode (manual or automatic) before starting
    #[arg(long, value_parser = parse_mode)]
    mode: Option<SyncMode>,

    /// Print service status and recent runs, then exit
    #[arg(long, conflicts_with = "once")]
    status: bool,
}

fn parse_mode(raw: &str) -> Result<SyncMode, String> {
    raw.parse().map_err(|e: core_runtime::Error| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_logging(config.logging.clone()).context("failed to initialize logging")?;
    info!(?config, "Configuration loaded");

    let service = core_service::bootstrap(&config)
        .await
        .context("failed to start sync service")?;

    if let Some(mode) = cli.mode {
        service.set_mode(mode).await?;
    }

    if cli.status {
        let status = service.status().await?;
        let recent = service.recent_runs(10).await?;
        let output = serde_json::json!({ "status": status, "recent_runs": recent });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.once {
        let report = service.run_now(cli.force).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(match report.error {
            None | Some(RunError::Cancelled) => ExitCode::SUCCESS,
            Some(_) => ExitCode::FAILURE,
        });
    }

    let mode = service.start().await?;
    info!(mode = %mode, "Waiting for scheduled runs; press Ctrl-C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl-C");
    }
    info!("Shutting down");
    service.shutdown(SHUTDOWN_GRACE).await;

    Ok(ExitCode::SUCCESS)
}
