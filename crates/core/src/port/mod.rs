// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod dedup;
pub mod driver_directory;
pub mod id_provider; // For deterministic testing
pub mod result_repository;
pub mod time_provider;

// Re-exports
pub use broker::{Delivery, RequestPublisher, RequestQueue, ResultQueue, ResultSink};
pub use dedup::ProcessedMarkers;
pub use driver_directory::DriverDirectory;
pub use id_provider::IdProvider;
pub use result_repository::MatchResultRepository;
pub use time_provider::TimeProvider;
