mod cli;
mod config;
mod jobs;
mod state;
mod wiring;

use clap::Parser;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::ConfigError;
use crate::jobs::JobError;
use crate::wiring::WiringError;
use harvest_infra::db::run_migrations;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("wiring error: {0}")]
    Wiring(#[from] WiringError),
    #[error("db error: {0}")]
    Db(#[from] harvest_infra::db::DbPoolError),
    #[error("job error: {0}")]
    Jobs(#[from] JobError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    config::load_dotenv()?;
    let mut config = config::AppConfig::from_env()?;
    config.apply_cli(&cli)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = wiring::build_state(config, shutdown_rx)?;
    run_migrations(&state.db).await?;

    let mode = cli.mode;
    let mut worker = tokio::spawn(async move {
        info!(?mode, "harvester starting");
        jobs::start(state, mode).await
    });

    let interrupted = tokio::select! {
        _ = shutdown_signal() => true,
        res = &mut worker => {
            res??;
            false
        }
    };
    if interrupted {
        info!("shutdown signal received; finishing current step");
        shutdown_tx.send_replace(true);
        worker.await??;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}
