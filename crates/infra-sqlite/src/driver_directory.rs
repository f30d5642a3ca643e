// SQLite DriverDirectory Implementation
//
// Distance ranking happens in Rust (SQLite has no trig functions); the
// claim itself is a conditional UPDATE, so two workers racing for the
// same driver resolve through rows_affected: the loser retries against
// the remaining candidates.

use crate::map_sqlx_error;
use async_trait::async_trait;
use ridematch_core::domain::{DriverId, GeoPoint};
use ridematch_core::error::Result;
use ridematch_core::port::DriverDirectory;
use sqlx::SqlitePool;
use tracing::debug;

pub struct SqliteDriverDirectory {
    pool: SqlitePool,
}

impl SqliteDriverDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register (or relocate) a driver as available
    pub async fn upsert_driver(&self, id: &str, location: GeoPoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drivers (id, lat, lon, available) VALUES (?, ?, ?, 1)
            ON CONFLICT(id) DO UPDATE SET lat = excluded.lat, lon = excluded.lon, available = 1
            "#,
        )
        .bind(id)
        .bind(location.lat)
        .bind(location.lon)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn available_drivers(&self) -> Result<Vec<(DriverId, GeoPoint)>> {
        let rows: Vec<(String, f64, f64)> =
            sqlx::query_as("SELECT id, lat, lon FROM drivers WHERE available = 1")
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, lat, lon)| (id, GeoPoint::new(lat, lon)))
            .collect())
    }
}

#[async_trait]
impl DriverDirectory for SqliteDriverDirectory {
    async fn reserve_nearest(&self, pickup: &GeoPoint) -> Result<Option<DriverId>> {
        loop {
            let mut candidates = self.available_drivers().await?;
            if candidates.is_empty() {
                return Ok(None);
            }

            candidates.sort_by(|a, b| {
                let da = a.1.distance_km(pickup);
                let db = b.1.distance_km(pickup);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            });

            for (driver_id, _) in candidates {
                let claimed = sqlx::query(
                    "UPDATE drivers SET available = 0 WHERE id = ? AND available = 1",
                )
                .bind(&driver_id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .rows_affected();

                if claimed == 1 {
                    debug!(driver_id = %driver_id, "Driver reserved");
                    return Ok(Some(driver_id));
                }
                // Lost the race for this driver; try the next-nearest
            }
            // Every candidate was claimed out from under us; re-read
        }
    }

    async fn release(&self, driver: &DriverId) -> Result<()> {
        sqlx::query("UPDATE drivers SET available = 1 WHERE id = ?")
            .bind(driver)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn directory() -> SqliteDriverDirectory {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteDriverDirectory::new(pool)
    }

    #[tokio::test]
    async fn reserves_nearest_and_marks_unavailable() {
        let dir = directory().await;
        dir.upsert_driver("far", GeoPoint::new(60.39, 5.32)).await.unwrap();
        dir.upsert_driver("near", GeoPoint::new(59.91, 10.75)).await.unwrap();

        let pickup = GeoPoint::new(59.9139, 10.7522);
        assert_eq!(
            dir.reserve_nearest(&pickup).await.unwrap().as_deref(),
            Some("near")
        );
        assert_eq!(
            dir.reserve_nearest(&pickup).await.unwrap().as_deref(),
            Some("far")
        );
        assert_eq!(dir.reserve_nearest(&pickup).await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_makes_driver_reservable_again() {
        let dir = directory().await;
        dir.upsert_driver("d1", GeoPoint::new(1.0, 1.0)).await.unwrap();

        let pickup = GeoPoint::new(1.0, 1.0);
        let id = dir.reserve_nearest(&pickup).await.unwrap().unwrap();
        assert_eq!(dir.reserve_nearest(&pickup).await.unwrap(), None);

        dir.release(&id).await.unwrap();
        assert_eq!(
            dir.reserve_nearest(&pickup).await.unwrap().as_deref(),
            Some("d1")
        );
    }

    #[tokio::test]
    async fn concurrent_reservations_never_share_a_driver() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let dir = std::sync::Arc::new(SqliteDriverDirectory::new(pool));

        for i in 0..4 {
            dir.upsert_driver(&format!("d{i}"), GeoPoint::new(1.0 + i as f64, 1.0))
                .await
                .unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let dir = dir.clone();
            tasks.spawn(async move {
                dir.reserve_nearest(&GeoPoint::new(1.0, 1.0)).await.unwrap()
            });
        }

        let mut claimed = Vec::new();
        while let Some(res) = tasks.join_next().await {
            claimed.push(res.unwrap().unwrap());
        }
        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 4, "duplicate reservation detected");
    }
}
