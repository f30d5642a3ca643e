// AMQP Connection Setup

use crate::map_lapin_error;
use lapin::{Connection, ConnectionProperties};
use ridematch_core::{AppError, Result};
use std::time::Duration;
use tracing::{info, warn};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(16);

/// Connect to the broker with bounded exponential backoff.
///
/// Workers never drop in-flight work over a broker outage; at startup the
/// same rule applies to the connection itself: keep retrying up to
/// `max_attempts` before surfacing `BrokerUnavailable`.
pub async fn connect_with_backoff(addr: &str, max_attempts: u32) -> Result<Connection> {
    let mut delay = INITIAL_RETRY_DELAY;
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match Connection::connect(addr, ConnectionProperties::default()).await {
            Ok(connection) => {
                info!(addr = %addr, attempt = attempt, "Connected to broker");
                return Ok(connection);
            }
            Err(e) => {
                warn!(
                    addr = %addr,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Broker connection failed, retrying"
                );
                last_error = Some(e);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }
    }

    Err(match last_error {
        Some(e) => map_lapin_error("connect", e),
        None => AppError::BrokerUnavailable(format!("no connection attempts made to {addr}")),
    })
}
