// Ride Request Domain Model

use crate::domain::geo::GeoPoint;
use serde::{Deserialize, Serialize};

/// Request ID (UUID v4, assigned by the producer)
pub type RequestId = String;

/// A ride request as it travels through the request queue.
///
/// Immutable once published; the broker removes it from the queue only
/// after a consumer acknowledges processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub request_id: RequestId,
    pub rider_location: GeoPoint,
    pub destination: GeoPoint,
    /// Intake timestamp in epoch ms, stamped by the producer
    pub requested_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl RideRequest {
    /// Create a new request
    ///
    /// # Arguments
    ///
    /// * `request_id` - Unique request ID (injected, not generated)
    /// * `requested_at` - Intake timestamp in epoch ms (injected, not system time)
    pub fn new(
        request_id: impl Into<String>,
        requested_at: i64,
        rider_location: GeoPoint,
        destination: GeoPoint,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            rider_location,
            destination,
            requested_at,
            priority: None,
        }
    }

    /// Create a test request with deterministic ID and timestamp.
    ///
    /// Uses a simple counter for deterministic test IDs (req-1, req-2, ...).
    /// Timestamps start at 1000 and increment by 1000.
    ///
    /// **Note**: This method should only be used in tests. For production code,
    /// always inject ID and time via providers.
    pub fn new_test(rider_location: GeoPoint, destination: GeoPoint) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static TEST_COUNTER: AtomicU64 = AtomicU64::new(1);

        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self::new(
            format!("req-{}", counter),
            (counter * 1000) as i64,
            rider_location,
            destination,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_optional_on_the_wire() {
        let json = r#"{
            "request_id": "abc",
            "rider_location": {"lat": 1.0, "lon": 2.0},
            "destination": {"lat": 3.0, "lon": 4.0},
            "requested_at": 1700000000000
        }"#;
        let req: RideRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_id, "abc");
        assert_eq!(req.priority, None);
    }

    #[test]
    fn round_trips_through_json() {
        let mut req = RideRequest::new_test(GeoPoint::new(1.0, 2.0), GeoPoint::new(3.0, 4.0));
        req.priority = Some(7);
        let bytes = serde_json::to_vec(&req).unwrap();
        let back: RideRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.request_id, req.request_id);
        assert_eq!(back.priority, Some(7));
    }
}
