use std::sync::Arc;

use harvest_infra::db::{DbPoolError, connect_lazy};
use harvest_infra::export::CsvTables;
use thiserror::Error;
use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("database error: {0}")]
    Db(#[from] DbPoolError),
}

pub fn build_state(
    config: AppConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<AppState, WiringError> {
    let db = connect_lazy(&config.database_path)?;
    let csv = config.csv_enabled.then(|| CsvTables::in_dir(&config.data_dir));
    info!(
        database = %config.database_path.display(),
        csv = config.csv_enabled,
        sources = config.sources.len(),
        "state wired"
    );
    Ok(AppState {
        config: Arc::new(config),
        db,
        csv,
        shutdown,
    })
}
