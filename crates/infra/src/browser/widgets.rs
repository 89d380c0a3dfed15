use chrono::DateTime;
use chrono_tz::Tz;
use harvest_core::domain::widgets::{ChartPoint, CloudTag, HistogramEntry};
use serde::Deserialize;
use serde_json::Value;
use thirtyfour::prelude::*;

use super::BrowserError;
use crate::markup::parse_histograms;

const CHART_JS: &str = r#"
const canvas = document.querySelector('canvas[data-err="сетевые сбои"]');
const chart = canvas && window.Chart ? Chart.getChart(canvas) : null;
if (!chart) { return null; }
return chart.data.datasets.map(set => set.data.map(point => ({ x: point.x, y: point.y })));
"#;

const CLOUD_JS: &str = r#"
return [...document.querySelectorAll('.bow svg text')]
    .map(t => ({ word: t.dataset.word, freq: parseFloat(t.dataset.freq) * 100 }));
"#;

#[derive(Debug, Deserialize)]
struct RawPoint {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    word: Option<String>,
    freq: Option<f64>,
}

pub async fn extract_chart(driver: &WebDriver, zone: Tz) -> Result<Vec<ChartPoint>, BrowserError> {
    let value: Value = driver.execute(CHART_JS, Vec::new()).await?.convert()?;
    chart_points(value, zone)
}

pub async fn extract_cloud(driver: &WebDriver) -> Result<Vec<CloudTag>, BrowserError> {
    let value: Value = driver.execute(CLOUD_JS, Vec::new()).await?.convert()?;
    cloud_tags(value)
}

pub async fn extract_histograms(driver: &WebDriver) -> Result<Vec<HistogramEntry>, BrowserError> {
    let html = driver.source().await?;
    Ok(parse_histograms(&html))
}

/// Pairs the complaints series with the failures series. `x` is epoch
/// millis; a missing failures series counts as zero.
pub fn chart_points(value: Value, zone: Tz) -> Result<Vec<ChartPoint>, BrowserError> {
    let datasets: Option<Vec<Vec<RawPoint>>> = serde_json::from_value(value)?;
    let Some(mut datasets) = datasets else {
        return Ok(Vec::new());
    };
    if datasets.is_empty() {
        return Ok(Vec::new());
    }
    let failures = if datasets.len() >= 2 {
        Some(datasets.remove(1))
    } else {
        None
    };
    let complaints = datasets.swap_remove(0);

    let points = match failures {
        Some(failures) => complaints
            .into_iter()
            .zip(failures)
            .filter_map(|(c, f)| point(&c, f.y.unwrap_or(0.0), zone))
            .collect(),
        None => complaints
            .into_iter()
            .filter_map(|c| point(&c, 0.0, zone))
            .collect(),
    };
    Ok(points)
}

fn point(raw: &RawPoint, failures: f64, zone: Tz) -> Option<ChartPoint> {
    let millis = raw.x?;
    let taken_at = DateTime::from_timestamp_millis(millis as i64)?.with_timezone(&zone);
    Some(ChartPoint {
        taken_at,
        complaints: raw.y? as i64,
        failures,
    })
}

/// Frequencies arrive already scaled to percent; stored with two decimals.
pub fn cloud_tags(value: Value) -> Result<Vec<CloudTag>, BrowserError> {
    let tags: Option<Vec<RawTag>> = serde_json::from_value(value)?;
    Ok(tags
        .unwrap_or_default()
        .into_iter()
        .filter_map(|tag| {
            let word = tag.word?.trim().to_string();
            if word.is_empty() {
                return None;
            }
            let frequency = (tag.freq.unwrap_or(0.0) * 100.0).round() / 100.0;
            Some(CloudTag { word, frequency })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono_tz::Europe::Moscow;
    use serde_json::json;

    use super::*;

    #[test]
    fn chart_pairs_both_series() {
        let value = json!([
            [{ "x": 1765931314342.0, "y": 12.0 }, { "x": 1765934914342.0, "y": 7.9 }],
            [{ "x": 1765931314342.0, "y": 0.5 }, { "x": 1765934914342.0, "y": 1.25 }]
        ]);
        let points = chart_points(value, Moscow).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].taken_at.to_rfc3339(), "2025-12-17T03:28:34.342+03:00");
        assert_eq!(points[0].complaints, 12);
        assert_eq!(points[0].failures, 0.5);
        assert_eq!(points[1].complaints, 7);
        assert_eq!(points[1].failures, 1.25);
    }

    #[test]
    fn single_series_has_zero_failures() {
        let value = json!([[{ "x": 1765931314342.0, "y": 3 }]]);
        let points = chart_points(value, Moscow).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].failures, 0.0);
    }

    #[test]
    fn missing_chart_is_empty() {
        assert!(chart_points(Value::Null, Moscow).unwrap().is_empty());
        assert!(chart_points(json!([]), Moscow).unwrap().is_empty());
    }

    #[test]
    fn cloud_rounds_and_skips_blank_words() {
        let value = json!([
            { "word": "приложение", "freq": 12.3456 },
            { "word": "", "freq": 1.0 },
            { "word": null, "freq": 1.0 },
            { "word": "оплата", "freq": null }
        ]);
        let tags = cloud_tags(value).unwrap();
        assert_eq!(
            tags,
            vec![
                CloudTag { word: "приложение".to_string(), frequency: 12.35 },
                CloudTag { word: "оплата".to_string(), frequency: 0.0 },
            ]
        );
    }

    #[test]
    fn malformed_cloud_is_an_error() {
        assert!(cloud_tags(json!({ "word": 1 })).is_err());
    }
}
