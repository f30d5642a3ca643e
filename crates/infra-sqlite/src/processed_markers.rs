// SQLite ProcessedMarkers Implementation

use crate::map_sqlx_error;
use async_trait::async_trait;
use ridematch_core::domain::RequestId;
use ridematch_core::error::Result;
use ridematch_core::port::{ProcessedMarkers, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteProcessedMarkers {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteProcessedMarkers {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }
}

#[async_trait]
impl ProcessedMarkers for SqliteProcessedMarkers {
    async fn mark_processed(&self, request_id: &RequestId, consumer_id: &str) -> Result<bool> {
        // INSERT OR IGNORE makes the marker race-free: exactly one writer
        // observes rows_affected == 1
        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO processed_requests (request_id, consumer_id, processed_at) VALUES (?, ?, ?)",
        )
        .bind(request_id)
        .bind(consumer_id)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        Ok(inserted == 1)
    }

    async fn is_processed(&self, request_id: &RequestId) -> Result<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processed_requests WHERE request_id = ?")
                .bind(request_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use ridematch_core::port::time_provider::SystemTimeProvider;

    async fn markers() -> SqliteProcessedMarkers {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteProcessedMarkers::new(pool, Arc::new(SystemTimeProvider))
    }

    #[tokio::test]
    async fn second_mark_reports_duplicate() {
        let markers = markers().await;
        let id = "req-1".to_string();

        assert!(!markers.is_processed(&id).await.unwrap());
        assert!(markers.mark_processed(&id, "C1").await.unwrap());
        assert!(!markers.mark_processed(&id, "C2").await.unwrap());
        assert!(markers.is_processed(&id).await.unwrap());
    }
}
