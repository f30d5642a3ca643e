// Driver Directory Port (driver-availability data source)

use crate::domain::{DriverId, GeoPoint};
use crate::error::Result;
use async_trait::async_trait;

/// Current driver-availability state, queried during the Match step.
///
/// Reservation must be atomic: two workers matching concurrently may
/// never reserve the same driver. A transient lookup failure (the
/// directory is an external dependency) maps to nack-with-requeue in
/// the worker.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    /// Atomically reserve the available driver nearest to `pickup`.
    /// Returns `None` when no driver is available - that is a valid
    /// matching outcome, not an error.
    async fn reserve_nearest(&self, pickup: &GeoPoint) -> Result<Option<DriverId>>;

    /// Return a previously reserved driver to the pool (e.g. when the
    /// result publish fails and the request is requeued)
    async fn release(&self, driver: &DriverId) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct DriverSlot {
        id: DriverId,
        location: GeoPoint,
        available: bool,
    }

    /// In-memory driver directory with failure and latency injection
    #[derive(Default)]
    pub struct InMemoryDriverDirectory {
        drivers: Mutex<Vec<DriverSlot>>,
        /// Remaining lookups that fail transiently
        fail_budget: AtomicU32,
        latency: Mutex<Duration>,
    }

    impl InMemoryDriverDirectory {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_driver(&self, id: impl Into<String>, location: GeoPoint) {
            self.drivers.lock().unwrap().push(DriverSlot {
                id: id.into(),
                location,
                available: true,
            });
        }

        /// Make the next `n` lookups fail transiently
        pub fn fail_next(&self, n: u32) {
            self.fail_budget.store(n, Ordering::SeqCst);
        }

        /// Inject per-lookup latency (for shutdown-drain tests)
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock().unwrap() = latency;
        }

        pub fn available_count(&self) -> usize {
            self.drivers
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.available)
                .count()
        }
    }

    #[async_trait]
    impl DriverDirectory for InMemoryDriverDirectory {
        async fn reserve_nearest(&self, pickup: &GeoPoint) -> Result<Option<DriverId>> {
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            if self
                .fail_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(AppError::Internal(
                    "driver directory unreachable".to_string(),
                ));
            }

            let mut drivers = self.drivers.lock().unwrap();
            let nearest = drivers
                .iter_mut()
                .filter(|d| d.available)
                .min_by(|a, b| {
                    let da = a.location.distance_km(pickup);
                    let db = b.location.distance_km(pickup);
                    da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                });

            Ok(nearest.map(|slot| {
                slot.available = false;
                slot.id.clone()
            }))
        }

        async fn release(&self, driver: &DriverId) -> Result<()> {
            let mut drivers = self.drivers.lock().unwrap();
            if let Some(slot) = drivers.iter_mut().find(|d| &d.id == driver) {
                slot.available = true;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemoryDriverDirectory;
    use super::*;

    #[tokio::test]
    async fn reserves_the_nearest_available_driver() {
        let directory = InMemoryDriverDirectory::new();
        directory.add_driver("far", GeoPoint::new(60.0, 10.0));
        directory.add_driver("near", GeoPoint::new(59.91, 10.75));

        let pickup = GeoPoint::new(59.9139, 10.7522);
        let first = directory.reserve_nearest(&pickup).await.unwrap();
        assert_eq!(first.as_deref(), Some("near"));

        // "near" is now reserved, the next reservation falls back
        let second = directory.reserve_nearest(&pickup).await.unwrap();
        assert_eq!(second.as_deref(), Some("far"));

        let third = directory.reserve_nearest(&pickup).await.unwrap();
        assert_eq!(third, None);
    }

    #[tokio::test]
    async fn release_returns_driver_to_pool() {
        let directory = InMemoryDriverDirectory::new();
        directory.add_driver("d1", GeoPoint::new(1.0, 1.0));

        let pickup = GeoPoint::new(1.0, 1.0);
        let id = directory.reserve_nearest(&pickup).await.unwrap().unwrap();
        assert_eq!(directory.available_count(), 0);

        directory.release(&id).await.unwrap();
        assert_eq!(directory.available_count(), 1);
    }

    #[tokio::test]
    async fn failure_injection_is_consumed() {
        let directory = InMemoryDriverDirectory::new();
        directory.add_driver("d1", GeoPoint::new(1.0, 1.0));
        directory.fail_next(1);

        let pickup = GeoPoint::new(1.0, 1.0);
        assert!(directory.reserve_nearest(&pickup).await.is_err());
        assert!(directory.reserve_nearest(&pickup).await.is_ok());
    }
}
