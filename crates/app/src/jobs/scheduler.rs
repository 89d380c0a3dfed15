use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use harvest_core::harvest::StopSignal;
use tracing::{info, warn};

use crate::jobs::JobError;

/// Runs `job` once a day at `at` wall clock in `zone` until `stop` is
/// raised. A failed run is logged and the next day is scheduled anyway.
pub async fn run_daily<F, Fut>(
    name: &'static str,
    zone: Tz,
    at: NaiveTime,
    mut stop: StopSignal,
    mut job: F,
) -> Result<(), JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    loop {
        let now = Utc::now().with_timezone(&zone);
        let next = next_run_after(now, at);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(job = name, next_run = %next.to_rfc3339(), wait_secs = wait.as_secs(), "job scheduled");
        if stop.pause(wait).await {
            info!(job = name, "scheduler stopped");
            return Ok(());
        }
        if let Err(err) = job().await {
            warn!(error = %err, job = name, "job execution failed");
        }
    }
}

/// First instant strictly after `now` whose local time is `at`. Days where
/// `at` falls into a DST gap are skipped.
pub fn next_run_after(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let zone = now.timezone();
    let mut day = now.date_naive();
    loop {
        if let Some(candidate) = zone.from_local_datetime(&day.and_time(at)).earliest() {
            if candidate > now {
                return candidate;
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => return now,
        };
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Asia::Almaty;
    use chrono_tz::Europe::Berlin;

    use super::*;

    fn nine() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 0, 0).unwrap()
    }

    #[test]
    fn later_today_when_before_run_time() {
        let now = Almaty.with_ymd_and_hms(2025, 12, 17, 8, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, nine()),
            Almaty.with_ymd_and_hms(2025, 12, 17, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn tomorrow_when_run_time_passed_or_now() {
        let exactly = Almaty.with_ymd_and_hms(2025, 12, 17, 9, 0, 0).unwrap();
        assert_eq!(
            next_run_after(exactly, nine()),
            Almaty.with_ymd_and_hms(2025, 12, 18, 9, 0, 0).unwrap()
        );
        let evening = Almaty.with_ymd_and_hms(2025, 12, 31, 22, 0, 0).unwrap();
        assert_eq!(
            next_run_after(evening, nine()),
            Almaty.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn dst_gap_moves_to_next_day() {
        let at = NaiveTime::from_hms_opt(2, 30, 0).unwrap();
        let now = Berlin.with_ymd_and_hms(2025, 3, 30, 0, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, at),
            Berlin.with_ymd_and_hms(2025, 3, 31, 2, 30, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn raised_stop_ends_scheduler_without_running() {
        let (_tx, rx) = tokio::sync::watch::channel(true);
        let mut runs = 0;
        run_daily("test", Almaty, nine(), StopSignal::from_watch(rx), || {
            runs += 1;
            async { Ok(()) }
        })
        .await
        .unwrap();
        assert_eq!(runs, 0);
    }
}
