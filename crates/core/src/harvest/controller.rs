use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::comments::{Comment, GUEST_NICKNAME, RawItem, Snapshot};
use crate::harvest::session::HarvestSession;
use crate::harvest::settings::HarvestSettings;
use crate::harvest::stop::StopSignal;
use crate::harvest::{BatchSink, HarvestError, HarvestReport, PageSource, TerminationReason};
use crate::types::source_key::SourceKey;
use crate::types::time_text::TimeNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    MissingTime,
    UnrecognizedTime,
    MissingBody,
}

impl SkipReason {
    fn label(self) -> &'static str {
        match self {
            SkipReason::MissingTime => "missing_time",
            SkipReason::UnrecognizedTime => "unrecognized_time",
            SkipReason::MissingBody => "missing_body",
        }
    }
}

enum ItemOutcome {
    Parsed(Comment),
    Skipped(SkipReason),
    /// Dated before the cutoff day.
    Stale(DateTime<Tz>),
}

struct BatchOutcome {
    reached_cutoff: bool,
}

/// Drives one [`PageSource`] through the initial scan and the load-more
/// loop, flushing every parsed batch to a [`BatchSink`].
#[derive(Debug, Clone)]
pub struct HarvestController {
    settings: HarvestSettings,
    normalizer: TimeNormalizer,
    stop: StopSignal,
}

impl HarvestController {
    pub fn new(settings: HarvestSettings) -> Self {
        let normalizer = TimeNormalizer::new(settings.reference_timezone);
        Self {
            settings,
            normalizer,
            stop: StopSignal::never(),
        }
    }

    pub fn with_normalizer(mut self, normalizer: TimeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Harvests `source` with the current wall clock as reference instant.
    pub async fn run<P, S>(
        &self,
        source: &SourceKey,
        page: &mut P,
        sink: &mut S,
    ) -> Result<HarvestReport, HarvestError>
    where
        P: PageSource,
        S: BatchSink,
    {
        let reference = Utc::now().with_timezone(&self.settings.reference_timezone);
        self.run_at(source, page, sink, reference).await
    }

    /// Only sink failures are returned as errors; every other failure ends
    /// in a [`TerminationReason`].
    pub async fn run_at<P, S>(
        &self,
        source: &SourceKey,
        page: &mut P,
        sink: &mut S,
        reference: DateTime<Tz>,
    ) -> Result<HarvestReport, HarvestError>
    where
        P: PageSource,
        S: BatchSink,
    {
        let mut session = HarvestSession::new(self.settings.cutoff_date, reference);
        let mut stop = self.stop.clone();
        info!(
            source = %source,
            cutoff = %session.cutoff_date(),
            reference = %session.reference().to_rfc3339(),
            "harvest started"
        );

        let reason = self
            .harvest(source, &mut session, page, sink, &mut stop)
            .await?;
        let report = session.finish(reason);
        info!(
            source = %source,
            reason = %report.reason,
            parsed = report.parsed,
            skipped = report.skipped,
            seen = report.seen,
            attempts = report.attempts,
            "harvest finished"
        );
        Ok(report)
    }

    async fn harvest<P, S>(
        &self,
        source: &SourceKey,
        session: &mut HarvestSession,
        page: &mut P,
        sink: &mut S,
        stop: &mut StopSignal,
    ) -> Result<TerminationReason, HarvestError>
    where
        P: PageSource,
        S: BatchSink,
    {
        if stop.is_raised() {
            return Ok(TerminationReason::AttemptBudgetExhausted);
        }

        match self.take_snapshot(source, page).await {
            Some(snapshot) => {
                let fresh = unseen(session, &snapshot);
                debug!(source = %source, visible = fresh.len(), "initial scan");
                let outcome = self.harvest_batch(source, session, fresh, sink).await?;
                if outcome.reached_cutoff {
                    info!(source = %source, "initial block already reaches the cutoff");
                    return Ok(TerminationReason::CutoffReached);
                }
            }
            None => warn!(source = %source, "initial snapshot unavailable; expanding anyway"),
        }

        self.expand(source, session, page, sink, stop).await
    }

    async fn expand<P, S>(
        &self,
        source: &SourceKey,
        session: &mut HarvestSession,
        page: &mut P,
        sink: &mut S,
        stop: &mut StopSignal,
    ) -> Result<TerminationReason, HarvestError>
    where
        P: PageSource,
        S: BatchSink,
    {
        let threshold = self.settings.failure_threshold();

        while session.attempts() < self.settings.max_attempts {
            if stop.is_raised() {
                info!(source = %source, "stop requested");
                return Ok(TerminationReason::AttemptBudgetExhausted);
            }
            let attempt = session.begin_attempt();

            let Some(before) = self.take_snapshot(source, page).await else {
                let failures = session.record_failure();
                if failures >= threshold {
                    return Ok(TerminationReason::RepeatedNoProgress);
                }
                if stop.pause(self.settings.idle_backoff).await {
                    return Ok(TerminationReason::AttemptBudgetExhausted);
                }
                continue;
            };
            let before_count = before.id_count();

            if !self.dispatch(page).await {
                let failures = session.record_failure();
                warn!(source = %source, attempt, failures, "load more could not be dispatched");
                if failures >= threshold {
                    return Ok(TerminationReason::AttemptBudgetExhausted);
                }
                if stop.pause(self.settings.dispatch_backoff).await {
                    return Ok(TerminationReason::AttemptBudgetExhausted);
                }
                continue;
            }

            if !self.wait_for_progress(page, before_count).await {
                debug!(source = %source, attempt, "no visible progress before timeout");
            }
            if stop.pause(self.settings.settle_delay).await {
                return Ok(TerminationReason::AttemptBudgetExhausted);
            }

            let Some(after) = self.take_snapshot(source, page).await else {
                let failures = session.record_failure();
                if failures >= threshold {
                    return Ok(TerminationReason::RepeatedNoProgress);
                }
                if stop.pause(self.settings.idle_backoff).await {
                    return Ok(TerminationReason::AttemptBudgetExhausted);
                }
                continue;
            };

            let fresh = unseen(session, &after);
            debug!(source = %source, attempt, new_ids = fresh.len(), "expanded");
            if fresh.is_empty() {
                if marker_moved(&before, &after) {
                    info!(source = %source, attempt, "marker moved without new comments");
                    return Ok(TerminationReason::NoMoreContent);
                }
                let failures = session.record_failure();
                debug!(source = %source, attempt, failures, threshold, "no new comments");
                if failures >= threshold {
                    return Ok(TerminationReason::RepeatedNoProgress);
                }
                if stop.pause(self.settings.idle_backoff).await {
                    return Ok(TerminationReason::AttemptBudgetExhausted);
                }
                continue;
            }

            let outcome = self.harvest_batch(source, session, fresh, sink).await?;
            if outcome.reached_cutoff {
                info!(source = %source, attempt, "reached comments older than the cutoff");
                return Ok(TerminationReason::CutoffReached);
            }
            if stop.pause(self.settings.batch_pause).await {
                return Ok(TerminationReason::AttemptBudgetExhausted);
            }
        }

        Ok(TerminationReason::AttemptBudgetExhausted)
    }

    /// Parses, flushes and marks `items`. Items arrive newest first, so the
    /// first stale comment drops itself and everything after it.
    async fn harvest_batch<S>(
        &self,
        source: &SourceKey,
        session: &mut HarvestSession,
        items: Vec<RawItem>,
        sink: &mut S,
    ) -> Result<BatchOutcome, HarvestError>
    where
        S: BatchSink,
    {
        let mut batch = Vec::new();
        let mut reached_cutoff = false;

        for item in items {
            if !session.mark_seen(&item.id) || reached_cutoff {
                continue;
            }
            match self.parse_item(source, &item, session) {
                ItemOutcome::Parsed(comment) => batch.push(comment),
                ItemOutcome::Stale(occurred_at) => {
                    debug!(
                        source = %source,
                        id = %item.id,
                        occurred_at = %occurred_at.to_rfc3339(),
                        "stale comment"
                    );
                    reached_cutoff = true;
                }
                ItemOutcome::Skipped(reason) => {
                    session.record_skip();
                    debug!(source = %source, id = %item.id, reason = reason.label(), "comment skipped");
                }
            }
        }

        if !batch.is_empty() {
            let parsed = batch.len();
            if let Err(error) = sink.append(&batch).await {
                warn!(source = %source, parsed, error = %error, "batch was not stored");
                return Err(HarvestError::Sink {
                    source_key: source.clone(),
                    batch,
                    error,
                });
            }
            session.record_batch(parsed);
            info!(source = %source, parsed, total = session.parsed(), "comment batch stored");
        }

        Ok(BatchOutcome { reached_cutoff })
    }

    fn parse_item(
        &self,
        source: &SourceKey,
        item: &RawItem,
        session: &HarvestSession,
    ) -> ItemOutcome {
        let Some(time_text) = non_empty(item.fields.time.as_deref()) else {
            return ItemOutcome::Skipped(SkipReason::MissingTime);
        };
        let Some(occurred_at) = self.normalizer.normalize(time_text, session.reference()) else {
            return ItemOutcome::Skipped(SkipReason::UnrecognizedTime);
        };
        let Some(body) = non_empty(item.fields.body.as_deref()) else {
            return ItemOutcome::Skipped(SkipReason::MissingBody);
        };
        if session.is_stale(&occurred_at) {
            return ItemOutcome::Stale(occurred_at);
        }
        let nickname = non_empty(item.fields.author.as_deref()).unwrap_or(GUEST_NICKNAME);
        ItemOutcome::Parsed(Comment {
            source: source.clone(),
            source_id: item.id.clone(),
            occurred_at,
            nickname: nickname.to_string(),
            body: body.to_string(),
        })
    }

    async fn take_snapshot<P: PageSource>(&self, source: &SourceKey, page: &mut P) -> Option<Snapshot> {
        match timeout(self.settings.action_timeout, page.snapshot()).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(err)) => {
                warn!(source = %source, error = %err, "snapshot failed");
                None
            }
            Err(_) => {
                warn!(source = %source, "snapshot timed out");
                None
            }
        }
    }

    async fn dispatch<P: PageSource>(&self, page: &mut P) -> bool {
        timeout(self.settings.action_timeout, page.reveal_more())
            .await
            .unwrap_or(false)
    }

    async fn wait_for_progress<P: PageSource>(&self, page: &mut P, baseline: usize) -> bool {
        let bound = self.settings.progress_timeout + self.settings.action_timeout;
        timeout(bound, page.await_progress(baseline, self.settings.progress_timeout))
            .await
            .unwrap_or(false)
    }
}

fn unseen(session: &HarvestSession, snapshot: &Snapshot) -> Vec<RawItem> {
    snapshot
        .items
        .iter()
        .filter(|item| !item.id.is_empty() && !session.seen().has(&item.id))
        .cloned()
        .collect()
}

fn marker_moved(before: &Snapshot, after: &Snapshot) -> bool {
    match (before.marker.as_deref(), after.marker.as_deref()) {
        (Some(old), Some(new)) => old != new,
        _ => false,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|text| !text.is_empty())
}
