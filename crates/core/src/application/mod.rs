// Application Layer - Use Cases and Worker Loops

pub mod db_writer;
pub mod matcher;
pub mod producer;

// Re-exports
pub use db_writer::{DbWriter, WriteOutcome};
pub use matcher::{shutdown_channel, CycleOutcome, MatcherWorker, ShutdownSender, ShutdownToken};
pub use producer::{ProducerService, SubmitRequest};
