// RideMatch Infrastructure - AMQP Adapter
// Implements: RequestPublisher, RequestQueue, ResultSink, ResultQueue

mod connection;
mod consumer;
mod publisher;
mod topology;

pub use connection::connect_with_backoff;
pub use consumer::{AmqpRequestQueue, AmqpResultQueue};
pub use publisher::{AmqpRequestPublisher, AmqpResultSink};
pub use topology::{
    declare_topology, DEAD_LETTER_EXCHANGE, DEAD_LETTER_QUEUE, REQUEST_QUEUE,
    RESULT_DEAD_LETTER_QUEUE, RESULT_QUEUE,
};

// Re-exported so the composition root can open channels without a direct
// lapin dependency
pub use lapin;

/// Map a lapin error into the core error type. Every broker failure is a
/// connectivity problem from the protocol's point of view: the caller
/// retries (producer) or lets the broker redeliver (worker).
pub(crate) fn map_lapin_error(context: &str, err: lapin::Error) -> ridematch_core::AppError {
    ridematch_core::AppError::BrokerUnavailable(format!("{context}: {err}"))
}
