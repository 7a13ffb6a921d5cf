//! `vantage` command-line tool.

mod cli;
mod commands;
mod error;
mod telemetry;

use chrono::Utc;
use clap::Parser;
use serde_json::json;
use std::process::ExitCode;
use tokio::sync::watch;
use vantage_core::{HealthStatus, TeamId};
use vantage_storage::{stale_cleanup_task, QueryCacheFactory, StaleCleanupConfig};

use crate::cli::{Cli, Command};
use crate::commands::print_json;
use crate::error::{CliError, CliResult};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init(cli.log_json) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Resolve { flags, team } => {
            let flags = commands::load_flags(&flags)?;
            print_json(&commands::resolve(&flags, TeamId::from_raw(team)))?;
        }
        Command::Check { flags, proposed } => {
            let existing = commands::load_flags(&flags)?;
            let proposed = commands::load_flag(&proposed)?;
            let outcome = commands::check(&existing, &proposed);
            print_json(&outcome)?;
            if !outcome.accepted {
                return Ok(ExitCode::from(2));
            }
        }
        Command::Stale { team, limit } => {
            let factory = factory(cli.config.as_deref())?;
            let index = factory.freshness_index();
            let rows = commands::stale(index.as_ref(), TeamId::from_raw(team), limit, Utc::now()).await?;
            print_json(&rows)?;
        }
        Command::Cleanup {
            team,
            older_than_secs,
        } => {
            let factory = factory(cli.config.as_deref())?;
            let index = factory.freshness_index();
            let removed = commands::cleanup(
                index.as_ref(),
                TeamId::from_raw(team),
                older_than_secs,
                Utc::now(),
            )
            .await?;
            print_json(&json!({ "removed": removed }))?;
        }
        Command::Sweep => sweep(cli.config.as_deref()).await?,
        Command::Health => {
            let report = factory(cli.config.as_deref())?.health_check().await;
            print_json(&report)?;
            if report.status == HealthStatus::Unhealthy {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn factory(config_path: Option<&std::path::Path>) -> CliResult<QueryCacheFactory> {
    let config = commands::load_config(config_path)?;
    Ok(QueryCacheFactory::from_config(&config)?)
}

async fn sweep(config_path: Option<&std::path::Path>) -> CliResult<()> {
    let config = commands::load_config(config_path)?;
    if !config.cleanup.enabled {
        tracing::warn!("Stale cleanup is disabled in configuration; nothing to do");
        return Ok(());
    }

    let factory = QueryCacheFactory::from_config(&config)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(stale_cleanup_task(
        factory.freshness_index(),
        StaleCleanupConfig::from(&config.cleanup),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| CliError::Output(format!("failed to listen for Ctrl-C: {}", e)))?;
    let _ = shutdown_tx.send(true);

    let metrics = handle
        .await
        .map_err(|e| CliError::Output(format!("cleanup task failed: {}", e)))?;
    let snapshot = metrics.snapshot();
    print_json(&json!({
        "cleanup_cycles": snapshot.cleanup_cycles,
        "entries_removed": snapshot.entries_removed,
        "cleanup_errors": snapshot.cleanup_errors,
    }))
}
