// Processed-Request Markers Port (idempotency / dedup store)

use crate::domain::RequestId;
use crate::error::Result;
use async_trait::async_trait;

/// Durable "processed" markers keyed by request_id.
///
/// The broker delivers at-least-once: a worker crash between
/// publish-confirm and ack causes a second delivery of the same request.
/// The marker lets the second delivery be acked without republishing a
/// result. Written after the result publish is confirmed, before the ack.
#[async_trait]
pub trait ProcessedMarkers: Send + Sync {
    /// Record a request as processed. Returns `false` when the marker
    /// already existed (a concurrent or earlier processing won).
    async fn mark_processed(&self, request_id: &RequestId, consumer_id: &str) -> Result<bool>;

    /// Idempotency check before committing a match
    async fn is_processed(&self, request_id: &RequestId) -> Result<bool>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory marker store
    #[derive(Default)]
    pub struct InMemoryProcessedMarkers {
        seen: Mutex<HashMap<RequestId, String>>,
    }

    impl InMemoryProcessedMarkers {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn len(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[async_trait]
    impl ProcessedMarkers for InMemoryProcessedMarkers {
        async fn mark_processed(&self, request_id: &RequestId, consumer_id: &str) -> Result<bool> {
            let mut seen = self.seen.lock().unwrap();
            if seen.contains_key(request_id) {
                return Ok(false);
            }
            seen.insert(request_id.clone(), consumer_id.to_string());
            Ok(true)
        }

        async fn is_processed(&self, request_id: &RequestId) -> Result<bool> {
            Ok(self.seen.lock().unwrap().contains_key(request_id))
        }
    }
}
