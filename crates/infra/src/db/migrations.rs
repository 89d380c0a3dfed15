use sqlx::migrate::Migrator;

use super::DbPool;
use super::DbPoolError;

static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_migrations(pool: &DbPool) -> Result<(), DbPoolError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use crate::db::{DbPool, connect_lazy};

    pub(crate) async fn migrated_pool() -> (TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = connect_lazy(&dir.path().join("harvest.db")).unwrap();
        super::run_migrations(&pool).await.unwrap();
        (dir, pool)
    }
}
