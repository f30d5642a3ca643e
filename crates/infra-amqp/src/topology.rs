// Queue Topology Declaration
//
// Declared idempotently by every process at startup, so the fleet can
// scale without any coordination about who creates what.

use crate::map_lapin_error;
use lapin::options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, ExchangeKind};
use ridematch_core::Result;
use tracing::info;

/// Shared request queue all matcher workers compete on
pub const REQUEST_QUEUE: &str = "ride_requests";

/// Result queue consumed by the DB worker
pub const RESULT_QUEUE: &str = "match_results";

/// Dead-letter exchange; rejected requests are routed here
pub const DEAD_LETTER_EXCHANGE: &str = "ridematch.dlx";

/// Parking queue for unprocessable requests, kept for manual inspection
pub const DEAD_LETTER_QUEUE: &str = "ride_requests.dead";

/// Parking queue for unprocessable result messages
pub const RESULT_DEAD_LETTER_QUEUE: &str = "match_results.dead";

/// Declare the durable queues and the dead-letter route.
pub async fn declare_topology(channel: &Channel) -> Result<()> {
    let durable = QueueDeclareOptions {
        durable: true,
        ..QueueDeclareOptions::default()
    };

    channel
        .exchange_declare(
            DEAD_LETTER_EXCHANGE,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| map_lapin_error("declare dead-letter exchange", e))?;

    channel
        .queue_declare(DEAD_LETTER_QUEUE, durable, FieldTable::default())
        .await
        .map_err(|e| map_lapin_error("declare dead-letter queue", e))?;

    channel
        .queue_bind(
            DEAD_LETTER_QUEUE,
            DEAD_LETTER_EXCHANGE,
            REQUEST_QUEUE, // dead-lettered messages keep their routing key
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| map_lapin_error("bind dead-letter queue", e))?;

    channel
        .queue_declare(RESULT_DEAD_LETTER_QUEUE, durable, FieldTable::default())
        .await
        .map_err(|e| map_lapin_error("declare result dead-letter queue", e))?;

    channel
        .queue_bind(
            RESULT_DEAD_LETTER_QUEUE,
            DEAD_LETTER_EXCHANGE,
            RESULT_QUEUE,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| map_lapin_error("bind result dead-letter queue", e))?;

    channel
        .queue_declare(REQUEST_QUEUE, durable, work_queue_args())
        .await
        .map_err(|e| map_lapin_error("declare request queue", e))?;

    channel
        .queue_declare(RESULT_QUEUE, durable, work_queue_args())
        .await
        .map_err(|e| map_lapin_error("declare result queue", e))?;

    info!(
        request_queue = REQUEST_QUEUE,
        result_queue = RESULT_QUEUE,
        dead_letter_queue = DEAD_LETTER_QUEUE,
        "Broker topology declared"
    );
    Ok(())
}

/// Arguments for the two work queues.
///
/// Quorum queues are required, not an optimization: only they stamp
/// `x-delivery-count` on redeliveries, and the requeue cap counts
/// attempts from that header. On a classic queue every redelivery looks
/// like attempt 2 and a transiently failing message would requeue
/// forever. Rejected (requeue=false) messages leave through the DLX,
/// keeping their routing key, so each queue parks into its own .dead
/// twin.
fn work_queue_args() -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-queue-type".into(),
        AMQPValue::LongString("quorum".into()),
    );
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(DEAD_LETTER_EXCHANGE.into()),
    );
    args
}
