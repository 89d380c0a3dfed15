use std::sync::Arc;

use harvest_core::harvest::StopSignal;
use harvest_infra::db::DbPool;
use harvest_infra::export::CsvTables;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub csv: Option<CsvTables>,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Stop signal for one run: process shutdown plus the optional run deadline.
    pub fn run_stop_signal(&self) -> StopSignal {
        let stop = StopSignal::from_watch(self.shutdown.clone());
        match self.config.run_deadline {
            Some(deadline) => stop.with_deadline(Instant::now() + deadline),
            None => stop,
        }
    }
}
