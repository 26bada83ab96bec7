//! ftp-backup - Main entry point

use clap::Parser;
use ftp_backup::cli::Cli;
use ftp_backup::orchestrator::Orchestrator;
use ftp_backup::shutdown::ShutdownCoordinator;
use ftp_backup::transport::NetworkConnector;
use ftp_backup::{utils, AppConfig};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    // Flags default from MONGO_* / MYSQL_*, so .env must be loaded before parsing
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::from(e.exit_code());
        }
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    if let Err(e) = utils::logger::init(log_level) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match config.transport() {
        Ok(transport) => tracing::info!(
            "Starting ftp-backup v{} ({} {}, dest {})",
            env!("CARGO_PKG_VERSION"),
            transport.protocol,
            transport.address(),
            transport.dest_dir
        ),
        Err(_) => tracing::info!(
            "Starting ftp-backup v{} (no remote store configured)",
            env!("CARGO_PKG_VERSION")
        ),
    }

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let cancel = coordinator.token();
    let signals = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.wait_for_signal().await })
    };

    let job = cli.command.into_job();
    let run = tokio::task::spawn_blocking(move || {
        let connector = NetworkConnector;
        let orchestrator = Orchestrator::new(&config, &connector, cancel);
        job.run(&orchestrator)
    });

    // The run always unwinds on its own; a signal only cancels its token
    let outcome = run.await;
    signals.abort();

    match outcome {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::error!("Run task failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
