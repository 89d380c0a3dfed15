pub mod table;

use std::path::Path;

use chrono::NaiveDate;
use harvest_core::domain::comments::Comment;
use harvest_core::domain::widgets::{ChartPoint, CloudTag, HistogramEntry};

pub use table::{CsvError, CsvTable};

use crate::db::MessageRecord;

/// The four exported tables under one data directory.
#[derive(Debug, Clone)]
pub struct CsvTables {
    pub graph: CsvTable,
    pub cloud: CsvTable,
    pub histograms: CsvTable,
    pub messages: CsvTable,
}

impl CsvTables {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            graph: CsvTable::new(
                dir.join("graph_data.csv"),
                &["Компания", "Дата парсинга", "Время", "Жалобы", "Сбои"],
            ),
            cloud: CsvTable::new(
                dir.join("cloud_tags.csv"),
                &["Компания", "Дата парсинга", "Слово", "Частота"],
            ),
            histograms: CsvTable::new(
                dir.join("histograms.csv"),
                &["Компания", "Дата парсинга", "Тип", "Название", "Процент"],
            ),
            messages: CsvTable::new(
                dir.join("user_messages.csv"),
                &["Компания", "Дата парсинга", "Время", "Ник", "Комментарий"],
            ),
        }
    }

    pub async fn ensure_exist(&self) -> Result<(), CsvError> {
        for table in [&self.graph, &self.cloud, &self.histograms, &self.messages] {
            table.ensure_exists().await?;
        }
        Ok(())
    }
}

pub fn message_rows(comments: &[Comment]) -> Vec<Vec<String>> {
    comments
        .iter()
        .map(|comment| {
            let record = MessageRecord::from(comment);
            vec![
                record.company,
                record.message_date,
                record.message_time,
                record.nickname,
                record.comment,
            ]
        })
        .collect()
}

pub fn chart_rows(company: &str, points: &[ChartPoint]) -> Vec<Vec<String>> {
    points
        .iter()
        .map(|point| {
            vec![
                company.to_string(),
                point.taken_at.format("%Y-%m-%d").to_string(),
                point.taken_at.format("%H:%M:%S").to_string(),
                point.complaints.to_string(),
                point.failures.to_string(),
            ]
        })
        .collect()
}

pub fn cloud_rows(company: &str, parse_date: NaiveDate, tags: &[CloudTag]) -> Vec<Vec<String>> {
    tags.iter()
        .map(|tag| {
            vec![
                company.to_string(),
                parse_date.to_string(),
                tag.word.clone(),
                tag.frequency.to_string(),
            ]
        })
        .collect()
}

pub fn histogram_rows(
    company: &str,
    parse_date: NaiveDate,
    entries: &[HistogramEntry],
) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            vec![
                company.to_string(),
                parse_date.to_string(),
                entry.kind.title().to_string(),
                entry.name.clone(),
                entry.percent.to_string(),
            ]
        })
        .collect()
}
