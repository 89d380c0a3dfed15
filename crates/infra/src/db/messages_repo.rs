use harvest_core::domain::comments::Comment;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;

// Six binds per row keeps every statement under SQLite's variable limit.
const ROWS_PER_STATEMENT: usize = 150;

#[derive(Debug, Error)]
pub enum MessagesRepoError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Row of `user_messages`. Date and time are the comment's wall clock in
/// the reference zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub company: String,
    pub source_id: String,
    pub message_date: String,
    pub message_time: String,
    pub nickname: String,
    pub comment: String,
}

impl From<&Comment> for MessageRecord {
    fn from(comment: &Comment) -> Self {
        Self {
            company: comment.source.as_str().to_string(),
            source_id: comment.source_id.clone(),
            message_date: comment.occurred_at.format("%Y-%m-%d").to_string(),
            message_time: comment.occurred_at.format("%H:%M:%S").to_string(),
            nickname: comment.nickname.clone(),
            comment: comment.body.clone(),
        }
    }
}

/// Appends all records in one transaction.
pub async fn insert_messages(
    pool: &SqlitePool,
    records: &[MessageRecord],
) -> Result<u64, MessagesRepoError> {
    if records.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut inserted = 0;
    for chunk in records.chunks(ROWS_PER_STATEMENT) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            INSERT INTO user_messages
                (company, source_id, message_date, message_time, nickname, comment)
            "#,
        );
        builder.push_values(chunk, |mut row, record| {
            row.push_bind(&record.company)
                .push_bind(&record.source_id)
                .push_bind(&record.message_date)
                .push_bind(&record.message_time)
                .push_bind(&record.nickname)
                .push_bind(&record.comment);
        });
        inserted += builder.build().execute(&mut *tx).await?.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn count_messages(pool: &SqlitePool, company: &str) -> Result<i64, MessagesRepoError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_messages WHERE company = ?")
        .bind(company)
        .fetch_one(pool)
        .await?;
    Ok(count)
}
