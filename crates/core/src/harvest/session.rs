use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;

use crate::harvest::dedup::DedupTracker;
use crate::harvest::{HarvestReport, TerminationReason};

/// Mutable state of harvesting one source. Owned by the controller for the
/// duration of a single run.
#[derive(Debug)]
pub struct HarvestSession {
    cutoff_date: NaiveDate,
    reference: DateTime<Tz>,
    seen: DedupTracker,
    consecutive_failures: usize,
    parsed: usize,
    skipped: usize,
    attempts: usize,
    batches: usize,
}

impl HarvestSession {
    pub fn new(cutoff_date: NaiveDate, reference: DateTime<Tz>) -> Self {
        Self {
            cutoff_date,
            reference,
            seen: DedupTracker::new(),
            consecutive_failures: 0,
            parsed: 0,
            skipped: 0,
            attempts: 0,
            batches: 0,
        }
    }

    pub fn cutoff_date(&self) -> NaiveDate {
        self.cutoff_date
    }

    /// Instant that relative labels are resolved against.
    pub fn reference(&self) -> DateTime<Tz> {
        self.reference
    }

    pub fn seen(&self) -> &DedupTracker {
        &self.seen
    }

    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn parsed(&self) -> usize {
        self.parsed
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn is_stale(&self, occurred_at: &DateTime<Tz>) -> bool {
        occurred_at.date_naive() < self.cutoff_date
    }

    pub(crate) fn mark_seen(&mut self, id: &str) -> bool {
        self.seen.mark(id)
    }

    pub(crate) fn begin_attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    pub(crate) fn record_failure(&mut self) -> usize {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub(crate) fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_batch(&mut self, parsed: usize) {
        self.parsed += parsed;
        self.batches += 1;
        self.consecutive_failures = 0;
    }

    pub fn finish(self, reason: TerminationReason) -> HarvestReport {
        HarvestReport {
            reason,
            parsed: self.parsed,
            skipped: self.skipped,
            seen: self.seen.len(),
            attempts: self.attempts,
            batches: self.batches,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Moscow;

    use super::HarvestSession;

    #[test]
    fn batch_resets_failures() {
        let reference = Moscow.with_ymd_and_hms(2025, 12, 17, 10, 0, 0).unwrap();
        let mut session =
            HarvestSession::new(NaiveDate::from_ymd_opt(2025, 12, 17).unwrap(), reference);
        assert_eq!(session.record_failure(), 1);
        assert_eq!(session.record_failure(), 2);
        session.record_batch(3);
        assert_eq!(session.consecutive_failures(), 0);
        assert_eq!(session.parsed(), 3);
    }

    #[test]
    fn stale_is_strictly_before_cutoff_day() {
        let reference = Moscow.with_ymd_and_hms(2025, 12, 17, 10, 0, 0).unwrap();
        let session =
            HarvestSession::new(NaiveDate::from_ymd_opt(2025, 12, 17).unwrap(), reference);
        let midnight = Moscow.with_ymd_and_hms(2025, 12, 17, 0, 0, 0).unwrap();
        let late_evening = Moscow.with_ymd_and_hms(2025, 12, 16, 23, 59, 0).unwrap();
        assert!(!session.is_stale(&midnight));
        assert!(session.is_stale(&late_evening));
    }
}
