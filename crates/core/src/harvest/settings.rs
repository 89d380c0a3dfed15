use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    /// Comments dated strictly before this day end the session.
    pub cutoff_date: NaiveDate,
    pub max_attempts: usize,
    pub max_consecutive_failures: usize,
    pub progress_timeout: Duration,
    /// Bound for a single snapshot or click.
    pub action_timeout: Duration,
    pub reference_timezone: Tz,
    pub dispatch_backoff: Duration,
    pub idle_backoff: Duration,
    pub settle_delay: Duration,
    pub batch_pause: Duration,
}

impl HarvestSettings {
    pub fn new(cutoff_date: NaiveDate, reference_timezone: Tz) -> Self {
        Self {
            cutoff_date,
            max_attempts: 100,
            max_consecutive_failures: 4,
            progress_timeout: Duration::from_secs(45),
            action_timeout: Duration::from_secs(60),
            reference_timezone,
            dispatch_backoff: Duration::from_secs(2),
            idle_backoff: Duration::from_millis(1200),
            settle_delay: Duration::from_millis(600),
            batch_pause: Duration::from_millis(800),
        }
    }

    /// No pauses between steps; timeouts stay in place.
    pub fn without_pauses(mut self) -> Self {
        self.dispatch_backoff = Duration::ZERO;
        self.idle_backoff = Duration::ZERO;
        self.settle_delay = Duration::ZERO;
        self.batch_pause = Duration::ZERO;
        self
    }

    pub(crate) fn failure_threshold(&self) -> usize {
        self.max_consecutive_failures.max(1)
    }
}
