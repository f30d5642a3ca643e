// ID Provider Port (for deterministic testing)

/// ID provider interface (allows deterministic IDs in tests)
pub trait IdProvider: Send + Sync {
    /// Generate a new unique request ID
    fn generate_id(&self) -> String;
}

/// UUID v4 provider (production)
pub struct UuidProvider;

impl IdProvider for UuidProvider {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Sequential IDs (seq-1, seq-2, ...) for deterministic tests
    #[derive(Default)]
    pub struct SequenceIdProvider {
        counter: AtomicU64,
    }

    impl IdProvider for SequenceIdProvider {
        fn generate_id(&self) -> String {
            format!("seq-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }
}
