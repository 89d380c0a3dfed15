pub mod controller;
pub mod dedup;
pub mod session;
pub mod settings;
pub mod stop;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::domain::comments::{Comment, Snapshot};
use crate::types::source_key::SourceKey;

pub use controller::HarvestController;
pub use dedup::DedupTracker;
pub use session::HarvestSession;
pub use settings::HarvestSettings;
pub use stop::StopSignal;

#[derive(Debug, Error)]
#[error("page error: {0}")]
pub struct PageError(pub String);

#[derive(Debug, Error)]
#[error("batch write failed: {0}")]
pub struct SinkError(pub String);

/// Rendered comment widget that can be asked to load more.
pub trait PageSource {
    fn snapshot(&mut self) -> impl Future<Output = Result<Snapshot, PageError>> + Send;

    /// Whether the load action was dispatched, not whether content arrived.
    fn reveal_more(&mut self) -> impl Future<Output = bool> + Send;

    /// Waits until more than `baseline` identifiers are rendered or the
    /// progress marker moves; `false` on timeout.
    fn await_progress(
        &mut self,
        baseline: usize,
        timeout: Duration,
    ) -> impl Future<Output = bool> + Send;
}

/// Durable destination for parsed batches. Appends may repeat across runs.
pub trait BatchSink {
    fn append(&mut self, records: &[Comment]) -> impl Future<Output = Result<(), SinkError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    NoMoreContent,
    CutoffReached,
    AttemptBudgetExhausted,
    RepeatedNoProgress,
}

impl TerminationReason {
    pub fn label(self) -> &'static str {
        match self {
            TerminationReason::NoMoreContent => "no_more_content",
            TerminationReason::CutoffReached => "cutoff_reached",
            TerminationReason::AttemptBudgetExhausted => "attempt_budget_exhausted",
            TerminationReason::RepeatedNoProgress => "repeated_no_progress",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub reason: TerminationReason,
    pub parsed: usize,
    pub skipped: usize,
    pub seen: usize,
    pub attempts: usize,
    pub batches: usize,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The sink rejected a batch; the batch is handed back untouched.
    #[error("sink failed for {source_key} ({} comments): {error}", .batch.len())]
    Sink {
        source_key: SourceKey,
        batch: Vec<Comment>,
        #[source]
        error: SinkError,
    },
}
