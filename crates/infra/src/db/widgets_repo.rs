use chrono::NaiveDate;
use harvest_core::domain::widgets::{ChartPoint, CloudTag, HistogramEntry};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;

const ROWS_PER_STATEMENT: usize = 150;

#[derive(Debug, Error)]
pub enum WidgetsRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub async fn insert_chart_points(
    pool: &SqlitePool,
    company: &str,
    points: &[ChartPoint],
) -> Result<u64, WidgetsRepoError> {
    if points.is_empty() {
        return Ok(0);
    }
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for chunk in points.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO graph_data (company, parse_date, parse_time, complaints, failures) ",
        );
        builder.push_values(chunk, |mut row, point| {
            row.push_bind(company)
                .push_bind(point.taken_at.format("%Y-%m-%d").to_string())
                .push_bind(point.taken_at.format("%H:%M:%S").to_string())
                .push_bind(point.complaints)
                .push_bind(point.failures);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn insert_cloud_tags(
    pool: &SqlitePool,
    company: &str,
    parse_date: NaiveDate,
    tags: &[CloudTag],
) -> Result<u64, WidgetsRepoError> {
    if tags.is_empty() {
        return Ok(0);
    }
    let parse_date = parse_date.format("%Y-%m-%d").to_string();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for chunk in tags.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO cloud_tags (company, parse_date, word, frequency) ");
        builder.push_values(chunk, |mut row, tag| {
            row.push_bind(company)
                .push_bind(&parse_date)
                .push_bind(&tag.word)
                .push_bind(tag.frequency);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn insert_histograms(
    pool: &SqlitePool,
    company: &str,
    parse_date: NaiveDate,
    entries: &[HistogramEntry],
) -> Result<u64, WidgetsRepoError> {
    if entries.is_empty() {
        return Ok(0);
    }
    let parse_date = parse_date.format("%Y-%m-%d").to_string();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for chunk in entries.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO histograms (company, parse_date, type, name, percent) ",
        );
        builder.push_values(chunk, |mut row, entry| {
            row.push_bind(company)
                .push_bind(&parse_date)
                .push_bind(entry.kind.title())
                .push_bind(&entry.name)
                .push_bind(entry.percent);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}
