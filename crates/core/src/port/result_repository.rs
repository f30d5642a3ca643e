// Match Result Repository Port (DB worker boundary)

use crate::domain::{MatchResult, RequestId};
use crate::error::Result;
use async_trait::async_trait;

/// Durable persistence of match results, one record per request_id.
///
/// `upsert` must be idempotent by request_id: redelivery of a result
/// message (or a duplicate published in the crash window between
/// publish-confirm and ack) persists exactly one record.
#[async_trait]
pub trait MatchResultRepository: Send + Sync {
    async fn upsert(&self, result: &MatchResult) -> Result<()>;

    async fn find_by_request_id(&self, request_id: &RequestId) -> Result<Option<MatchResult>>;

    async fn count(&self) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory repository, first write per request_id wins
    #[derive(Default)]
    pub struct InMemoryMatchResultRepository {
        rows: Mutex<HashMap<RequestId, MatchResult>>,
    }

    impl InMemoryMatchResultRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn all(&self) -> Vec<MatchResult> {
            self.rows.lock().unwrap().values().cloned().collect()
        }
    }

    #[async_trait]
    impl MatchResultRepository for InMemoryMatchResultRepository {
        async fn upsert(&self, result: &MatchResult) -> Result<()> {
            self.rows
                .lock()
                .unwrap()
                .entry(result.request_id.clone())
                .or_insert_with(|| result.clone());
            Ok(())
        }

        async fn find_by_request_id(&self, request_id: &RequestId) -> Result<Option<MatchResult>> {
            Ok(self.rows.lock().unwrap().get(request_id).cloned())
        }

        async fn count(&self) -> Result<i64> {
            Ok(self.rows.lock().unwrap().len() as i64)
        }
    }
}
