use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use chrono::{Days, NaiveDate, Utc};
use futures::FutureExt;
use harvest_core::domain::widgets::{ChartPoint, CloudTag, HistogramEntry, HistogramKind};
use harvest_core::harvest::{
    HarvestController, HarvestReport, HarvestSettings, StopSignal, TerminationReason,
};
use harvest_core::types::source_key::SourceKey;
use harvest_infra::browser::{
    Browser, WidgetPage, extract_chart, extract_cloud, extract_histograms,
};
use harvest_infra::db::{insert_chart_points, insert_cloud_tags, insert_histograms};
use harvest_infra::export::{chart_rows, cloud_rows, histogram_rows};
use harvest_infra::sink::StorageSink;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::jobs::JobError;
use crate::state::AppState;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub sources: usize,
    pub harvested: usize,
    pub failed: usize,
    pub not_started: usize,
    pub comments: usize,
    pub cutoff_reached: usize,
    pub chart_points: usize,
    pub cloud_tags: usize,
    pub histogram_entries: usize,
}

impl RunStats {
    fn record(&mut self, outcome: &SourceOutcome) {
        self.harvested += 1;
        self.comments += outcome.report.parsed;
        if outcome.report.reason == TerminationReason::CutoffReached {
            self.cutoff_reached += 1;
        }
        self.chart_points += outcome.widgets.chart_points;
        self.cloud_tags += outcome.widgets.cloud_tags;
        self.histogram_entries += outcome.widgets.histogram_entries;
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WidgetCounts {
    chart_points: usize,
    cloud_tags: usize,
    histogram_entries: usize,
}

#[derive(Debug)]
struct SourceOutcome {
    report: HarvestReport,
    widgets: WidgetCounts,
}

/// Harvests every configured source with one browser session. A failing
/// or panicking source is logged and skipped; the session is closed before
/// returning.
pub async fn run(state: &AppState) -> Result<RunStats, JobError> {
    let config = &state.config;
    if let Some(csv) = &state.csv {
        csv.ensure_exist().await?;
    }
    let run_date = Utc::now().with_timezone(&config.timezone).date_naive();
    let cutoff = cutoff_date(run_date, config.days_back);
    let mut stop = state.run_stop_signal();
    let controller = HarvestController::new(harvest_settings(config, cutoff)).with_stop(stop.clone());

    info!(
        sources = config.sources.len(),
        %run_date,
        %cutoff,
        "harvest run starting"
    );
    let browser = Browser::launch(&config.browser_settings()).await?;

    let mut stats = RunStats {
        sources: config.sources.len(),
        ..RunStats::default()
    };
    for (index, source) in config.sources.iter().enumerate() {
        if stop.is_raised() {
            stats.not_started = config.sources.len() - index;
            info!(remaining = stats.not_started, "stop requested; remaining sources skipped");
            break;
        }
        let work = harvest_source(state, &browser, &controller, &mut stop, source, run_date);
        match guarded(work).await {
            Ok(outcome) => {
                info!(
                    source = %source,
                    reason = %outcome.report.reason,
                    comments = outcome.report.parsed,
                    "source harvested"
                );
                stats.record(&outcome);
            }
            Err(err) => {
                stats.failed += 1;
                warn!(source = %source, error = %err, "source failed; moving on");
            }
        }
    }

    if let Err(err) = browser.close().await {
        warn!(error = %err, "browser session close failed");
    }
    Ok(stats)
}

/// Turns a panic inside one source into an ordinary source failure.
async fn guarded<F, T>(work: F) -> Result<T, JobError>
where
    F: Future<Output = Result<T, JobError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(JobError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn harvest_source(
    state: &AppState,
    browser: &Browser,
    controller: &HarvestController,
    stop: &mut StopSignal,
    source: &SourceKey,
    run_date: NaiveDate,
) -> Result<SourceOutcome, JobError> {
    let url = source.page_url(&state.config.base_url);
    info!(source = %source, %url, "opening source page");
    browser.open(&url).await?;
    if stop.pause(state.config.page_settle).await {
        debug!(source = %source, "stop raised while the page was settling");
    }

    let widgets = collect_widgets(state, browser, source, run_date).await;

    let mut page = WidgetPage::new(browser.driver(), source.clone());
    let mut sink = StorageSink::new(
        state.db.clone(),
        state.csv.as_ref().map(|tables| tables.messages.clone()),
    );
    let report = controller.run(source, &mut page, &mut sink).await?;
    Ok(SourceOutcome { report, widgets })
}

async fn collect_widgets(
    state: &AppState,
    browser: &Browser,
    source: &SourceKey,
    run_date: NaiveDate,
) -> WidgetCounts {
    let mut counts = WidgetCounts::default();

    match extract_chart(browser.driver(), state.config.timezone).await {
        Ok(points) => match store_chart(state, source, &points).await {
            Ok(stored) => counts.chart_points = stored,
            Err(err) => warn!(source = %source, widget = "chart", error = %err, "widget not stored"),
        },
        Err(err) => warn!(source = %source, widget = "chart", error = %err, "widget extraction failed"),
    }

    match extract_cloud(browser.driver()).await {
        Ok(tags) => match store_cloud(state, source, run_date, &tags).await {
            Ok(stored) => counts.cloud_tags = stored,
            Err(err) => warn!(source = %source, widget = "cloud", error = %err, "widget not stored"),
        },
        Err(err) => warn!(source = %source, widget = "cloud", error = %err, "widget extraction failed"),
    }

    match extract_histograms(browser.driver()).await {
        Ok(entries) => match store_histograms(state, source, run_date, &entries).await {
            Ok(stored) => counts.histogram_entries = stored,
            Err(err) => {
                warn!(source = %source, widget = "histograms", error = %err, "widget not stored")
            }
        },
        Err(err) => {
            warn!(source = %source, widget = "histograms", error = %err, "widget extraction failed")
        }
    }

    debug!(source = %source, ?counts, "widgets collected");
    counts
}

async fn store_chart(
    state: &AppState,
    source: &SourceKey,
    points: &[ChartPoint],
) -> Result<usize, JobError> {
    if points.is_empty() {
        return Ok(0);
    }
    insert_chart_points(&state.db, source.as_str(), points).await?;
    if let Some(csv) = &state.csv {
        csv.graph.append(&chart_rows(source.as_str(), points)).await?;
    }
    Ok(points.len())
}

async fn store_cloud(
    state: &AppState,
    source: &SourceKey,
    run_date: NaiveDate,
    tags: &[CloudTag],
) -> Result<usize, JobError> {
    if tags.is_empty() {
        return Ok(0);
    }
    insert_cloud_tags(&state.db, source.as_str(), run_date, tags).await?;
    if let Some(csv) = &state.csv {
        csv.cloud.append(&cloud_rows(source.as_str(), run_date, tags)).await?;
    }
    Ok(tags.len())
}

async fn store_histograms(
    state: &AppState,
    source: &SourceKey,
    run_date: NaiveDate,
    entries: &[HistogramEntry],
) -> Result<usize, JobError> {
    if entries.is_empty() {
        return Ok(0);
    }
    for kind in [HistogramKind::Region, HistogramKind::Cause, HistogramKind::Device] {
        let count = entries.iter().filter(|entry| entry.kind == kind).count();
        debug!(source = %source, kind = kind.label(), count, "histogram entries");
    }
    insert_histograms(&state.db, source.as_str(), run_date, entries).await?;
    if let Some(csv) = &state.csv {
        csv.histograms
            .append(&histogram_rows(source.as_str(), run_date, entries))
            .await?;
    }
    Ok(entries.len())
}

/// Oldest calendar day still harvested.
fn cutoff_date(run_date: NaiveDate, days_back: u32) -> NaiveDate {
    run_date
        .checked_sub_days(Days::new(u64::from(days_back)))
        .unwrap_or(NaiveDate::MIN)
}

fn harvest_settings(config: &AppConfig, cutoff: NaiveDate) -> HarvestSettings {
    let mut settings = HarvestSettings::new(cutoff, config.timezone);
    settings.max_attempts = config.max_attempts;
    settings.max_consecutive_failures = config.max_consecutive_failures;
    settings.progress_timeout = config.progress_timeout;
    settings.action_timeout = config.action_timeout;
    settings
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;
    use harvest_infra::db::run_migrations;
    use tokio::sync::watch;

    use super::*;
    use crate::wiring::build_state;

    async fn test_state(dir: &std::path::Path) -> AppState {
        let env = HashMap::from([
            ("HARVEST_DATA_DIR".to_string(), dir.display().to_string()),
            ("HARVEST_SOURCES".to_string(), "mts".to_string()),
        ]);
        let config = AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap();
        let (_tx, rx) = watch::channel(false);
        let state = build_state(config, rx).unwrap();
        run_migrations(&state.db).await.unwrap();
        state
    }

    fn mts() -> SourceKey {
        SourceKey::try_from("mts").unwrap()
    }

    #[test]
    fn cutoff_counts_whole_days_back() {
        let run_date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(cutoff_date(run_date, 0), run_date);
        assert_eq!(cutoff_date(run_date, 1), NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
    }

    #[test]
    fn settings_follow_config() {
        let env: HashMap<String, String> = HashMap::from([
            ("HARVEST_MAX_ATTEMPTS".to_string(), "7".to_string()),
            ("HARVEST_PROGRESS_TIMEOUT_SECS".to_string(), "10".to_string()),
        ]);
        let config = AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap();
        let cutoff = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();
        let settings = harvest_settings(&config, cutoff);
        assert_eq!(settings.max_attempts, 7);
        assert_eq!(settings.max_consecutive_failures, 4);
        assert_eq!(settings.progress_timeout, Duration::from_secs(10));
        assert_eq!(settings.cutoff_date, cutoff);
        assert_eq!(settings.reference_timezone, Moscow);
    }

    #[tokio::test]
    async fn widgets_go_to_database_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let run_date = NaiveDate::from_ymd_opt(2025, 12, 17).unwrap();

        let points = vec![ChartPoint {
            taken_at: Moscow.with_ymd_and_hms(2025, 12, 17, 9, 0, 0).unwrap(),
            complaints: 3,
            failures: 0.0,
        }];
        let entries = vec![HistogramEntry {
            kind: HistogramKind::Device,
            name: "iOS".to_string(),
            percent: 30.5,
        }];
        assert_eq!(store_chart(&state, &mts(), &points).await.unwrap(), 1);
        assert_eq!(store_cloud(&state, &mts(), run_date, &[]).await.unwrap(), 0);
        assert_eq!(store_histograms(&state, &mts(), run_date, &entries).await.unwrap(), 1);

        let csv = state.csv.as_ref().unwrap();
        let graph = tokio::fs::read_to_string(csv.graph.path()).await.unwrap();
        assert!(graph.ends_with("mts;2025-12-17;09:00:00;3;0\n"));
        let hist = tokio::fs::read_to_string(csv.histograms.path()).await.unwrap();
        assert!(hist.ends_with("mts;2025-12-17;Устройство;iOS;30.5\n"));
        assert!(!csv.cloud.path().exists());
    }

    async fn crashing_source() -> Result<usize, JobError> {
        panic!("page script crashed")
    }

    #[tokio::test]
    async fn panicking_source_becomes_a_failure() {
        let err = guarded(crashing_source()).await.unwrap_err();
        assert!(matches!(err, JobError::Panicked(ref message) if message == "page script crashed"));
        assert_eq!(guarded(async { Ok::<_, JobError>(3) }).await.unwrap(), 3);
    }

    #[test]
    fn stats_count_cutoff_sources() {
        let mut stats = RunStats::default();
        let outcome = SourceOutcome {
            report: HarvestReport {
                reason: TerminationReason::CutoffReached,
                parsed: 12,
                skipped: 1,
                seen: 13,
                attempts: 2,
                batches: 3,
            },
            widgets: WidgetCounts {
                chart_points: 24,
                cloud_tags: 5,
                histogram_entries: 9,
            },
        };
        stats.record(&outcome);
        assert_eq!(stats.harvested, 1);
        assert_eq!(stats.comments, 12);
        assert_eq!(stats.cutoff_reached, 1);
        assert_eq!(stats.chart_points, 24);
    }
}
