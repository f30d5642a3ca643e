// SQLite MatchResultRepository Implementation

use crate::map_sqlx_error;
use async_trait::async_trait;
use ridematch_core::domain::{MatchResult, RequestId, UnmatchedReason};
use ridematch_core::error::Result;
use ridematch_core::port::MatchResultRepository;
use sqlx::SqlitePool;

pub struct SqliteMatchResultRepository {
    pool: SqlitePool,
}

impl SqliteMatchResultRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct MatchResultRow {
    request_id: String,
    matched: i64,
    driver_id: Option<String>,
    reason: Option<String>,
    consumer_id: String,
    matched_at: i64,
}

impl From<MatchResultRow> for MatchResult {
    fn from(row: MatchResultRow) -> Self {
        MatchResult {
            request_id: row.request_id,
            matched: row.matched != 0,
            driver_id: row.driver_id,
            reason: row.reason.as_deref().and_then(UnmatchedReason::parse),
            consumer_id: row.consumer_id,
            matched_at: row.matched_at,
        }
    }
}

#[async_trait]
impl MatchResultRepository for SqliteMatchResultRepository {
    async fn upsert(&self, result: &MatchResult) -> Result<()> {
        // First durable write per request_id wins; a redelivered result
        // message is a no-op
        sqlx::query(
            r#"
            INSERT INTO match_results (
                request_id, matched, driver_id, reason, consumer_id, matched_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(request_id) DO NOTHING
            "#,
        )
        .bind(&result.request_id)
        .bind(if result.matched { 1 } else { 0 })
        .bind(&result.driver_id)
        .bind(result.reason.map(|r| r.as_str()))
        .bind(&result.consumer_id)
        .bind(result.matched_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_request_id(&self, request_id: &RequestId) -> Result<Option<MatchResult>> {
        let row = sqlx::query_as::<_, MatchResultRow>(
            "SELECT * FROM match_results WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(MatchResult::from))
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM match_results")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn repo() -> SqliteMatchResultRepository {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteMatchResultRepository::new(pool)
    }

    #[tokio::test]
    async fn upsert_then_find_round_trips() {
        let repo = repo().await;
        let result = MatchResult::matched("req-1", "drv-7", "C2", 1234);
        repo.upsert(&result).await.unwrap();

        let stored = repo
            .find_by_request_id(&"req-1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.matched);
        assert_eq!(stored.driver_id.as_deref(), Some("drv-7"));
        assert_eq!(stored.consumer_id, "C2");
        assert_eq!(stored.matched_at, 1234);
    }

    #[tokio::test]
    async fn duplicate_upsert_keeps_first_record() {
        let repo = repo().await;
        repo.upsert(&MatchResult::matched("req-1", "drv-1", "C1", 1000))
            .await
            .unwrap();
        repo.upsert(&MatchResult::matched("req-1", "drv-2", "C3", 9999))
            .await
            .unwrap();

        assert_eq!(repo.count().await.unwrap(), 1);
        let stored = repo
            .find_by_request_id(&"req-1".to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.driver_id.as_deref(), Some("drv-1"));
    }

    #[tokio::test]
    async fn unmatched_reason_survives_storage() {
        let repo = repo().await;
        let result = MatchResult::unmatched(
            "req-2",
            UnmatchedReason::NoDriverAvailable,
            "C1",
            2000,
        );
        repo.upsert(&result).await.unwrap();

        let stored = repo
            .find_by_request_id(&"req-2".to_string())
            .await
            .unwrap()
            .unwrap();
        assert!(!stored.matched);
        assert_eq!(stored.reason, Some(UnmatchedReason::NoDriverAvailable));
    }
}
