pub mod scheduler;
pub mod tasks;

use harvest_core::harvest::{HarvestError, StopSignal};
use harvest_infra::browser::BrowserError;
use harvest_infra::db::WidgetsRepoError;
use harvest_infra::export::CsvError;
use thiserror::Error;
use tracing::{info, warn};

use crate::cli::Mode;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("harvest error: {0}")]
    Harvest(#[from] HarvestError),
    #[error("widgets db error: {0}")]
    WidgetsDb(#[from] WidgetsRepoError),
    #[error("csv error: {0}")]
    Csv(#[from] CsvError),
    #[error("source panicked: {0}")]
    Panicked(String),
}

pub async fn start(state: AppState, mode: Mode) -> Result<(), JobError> {
    match mode {
        Mode::Once => {
            let stats = tasks::harvest_run::run(&state).await?;
            info!(?stats, "harvest run complete");
            Ok(())
        }
        Mode::Daily => {
            let config = state.config.clone();
            let stop = StopSignal::from_watch(state.shutdown.clone());
            scheduler::run_daily("harvest", config.run_timezone, config.run_at, stop, move || {
                let state = state.clone();
                async move {
                    match tasks::harvest_run::run(&state).await {
                        Ok(stats) => info!(?stats, "harvest run complete"),
                        Err(err) => warn!(error = %err, "harvest run failed"),
                    }
                    Ok(())
                }
            })
            .await
        }
    }
}
