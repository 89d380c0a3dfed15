use harvest_core::domain::comments::Comment;
use harvest_core::harvest::{BatchSink, SinkError};
use tracing::debug;

use crate::db::{DbPool, MessageRecord, insert_messages};
use crate::export::{CsvTable, message_rows};

/// Writes comment batches to `user_messages` and, when configured, to the
/// messages CSV table.
///
/// SQLite is committed first and the CSV append follows. A CSV failure
/// fails the batch even though its rows are already in SQLite, so a caller
/// that retries the returned batch gets those rows twice in the database.
/// Delivery is at-least-once.
#[derive(Debug, Clone)]
pub struct StorageSink {
    pool: DbPool,
    csv: Option<CsvTable>,
}

impl StorageSink {
    pub fn new(pool: DbPool, csv: Option<CsvTable>) -> Self {
        Self { pool, csv }
    }
}

impl BatchSink for StorageSink {
    async fn append(&mut self, records: &[Comment]) -> Result<(), SinkError> {
        let rows: Vec<MessageRecord> = records.iter().map(MessageRecord::from).collect();
        let inserted = insert_messages(&self.pool, &rows)
            .await
            .map_err(|err| SinkError(err.to_string()))?;
        if let Some(csv) = &self.csv {
            csv.append(&message_rows(records))
                .await
                .map_err(|err| SinkError(err.to_string()))?;
        }
        debug!(inserted, "comment batch written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;
    use harvest_core::types::source_key::SourceKey;

    use super::*;
    use crate::db::count_messages;
    use crate::db::migrations::test_support::migrated_pool;
    use crate::export::CsvTables;

    fn comments() -> Vec<Comment> {
        ["1", "2"]
            .into_iter()
            .map(|id| Comment {
                source: SourceKey::try_from("bilajn").unwrap(),
                source_id: id.to_string(),
                occurred_at: Moscow.with_ymd_and_hms(2025, 12, 17, 8, 0, 0).unwrap(),
                nickname: "Гость".to_string(),
                body: format!("сообщение {id}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn writes_database_and_csv() {
        let (dir, pool) = migrated_pool().await;
        let tables = CsvTables::in_dir(dir.path());
        let mut sink = StorageSink::new(pool.clone(), Some(tables.messages.clone()));

        sink.append(&comments()).await.unwrap();

        assert_eq!(count_messages(&pool, "bilajn").await.unwrap(), 2);
        let text = tokio::fs::read_to_string(tables.messages.path()).await.unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("bilajn;2025-12-17;08:00:00;Гость;сообщение 2"));
    }

    #[tokio::test]
    async fn database_only_without_csv() {
        let (dir, pool) = migrated_pool().await;
        let mut sink = StorageSink::new(pool.clone(), None);
        sink.append(&comments()).await.unwrap();
        assert_eq!(count_messages(&pool, "bilajn").await.unwrap(), 2);
        assert!(!dir.path().join("user_messages.csv").exists());
    }

    #[tokio::test]
    async fn csv_failure_fails_the_batch_after_the_database_commit() {
        let (dir, pool) = migrated_pool().await;
        let unwritable = CsvTable::new(dir.path(), &["Компания"]);
        let mut sink = StorageSink::new(pool.clone(), Some(unwritable));

        assert!(sink.append(&comments()).await.is_err());
        assert_eq!(count_messages(&pool, "bilajn").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unavailable_database_is_a_sink_error() {
        let (_dir, pool) = migrated_pool().await;
        pool.close().await;
        let mut sink = StorageSink::new(pool, None);
        assert!(sink.append(&comments()).await.is_err());
    }
}
