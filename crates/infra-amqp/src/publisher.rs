// Confirmed Publishers
//
// Both publishers run their channel in confirm mode and wait for the
// broker ack before returning: `publish_confirmed` returning Ok means
// the message is durably with the broker. The producer relies on this
// for its Submit contract, the matcher for the ack-after-publish rule.

use crate::topology::{REQUEST_QUEUE, RESULT_QUEUE};
use crate::map_lapin_error;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::{BasicProperties, Channel};
use ridematch_core::domain::{MatchResult, RideRequest};
use ridematch_core::port::{RequestPublisher, ResultSink};
use ridematch_core::{AppError, Result};
use tracing::debug;

/// Persistent delivery mode (survives broker restart on a durable queue)
const DELIVERY_MODE_PERSISTENT: u8 = 2;

async fn publish_confirmed_raw(channel: &Channel, queue: &str, payload: &[u8]) -> Result<()> {
    let confirm = channel
        .basic_publish(
            "", // default exchange routes by queue name
            queue,
            BasicPublishOptions::default(),
            payload,
            BasicProperties::default().with_delivery_mode(DELIVERY_MODE_PERSISTENT),
        )
        .await
        .map_err(|e| map_lapin_error("publish", e))?
        .await
        .map_err(|e| map_lapin_error("publish confirm", e))?;

    if let Confirmation::Nack(_) = confirm {
        return Err(AppError::BrokerUnavailable(format!(
            "broker nacked publish to {queue}"
        )));
    }
    Ok(())
}

pub struct AmqpRequestPublisher {
    channel: Channel,
}

impl AmqpRequestPublisher {
    pub async fn new(channel: Channel) -> Result<Self> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| map_lapin_error("confirm_select", e))?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl RequestPublisher for AmqpRequestPublisher {
    async fn publish_confirmed(&self, request: &RideRequest) -> Result<()> {
        let payload = serde_json::to_vec(request)?;
        publish_confirmed_raw(&self.channel, REQUEST_QUEUE, &payload).await?;
        debug!(request_id = %request.request_id, queue = REQUEST_QUEUE, "Request published");
        Ok(())
    }
}

pub struct AmqpResultSink {
    channel: Channel,
}

impl AmqpResultSink {
    pub async fn new(channel: Channel) -> Result<Self> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| map_lapin_error("confirm_select", e))?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl ResultSink for AmqpResultSink {
    async fn publish_confirmed(&self, result: &MatchResult) -> Result<()> {
        let payload = serde_json::to_vec(result)?;
        publish_confirmed_raw(&self.channel, RESULT_QUEUE, &payload).await?;
        debug!(request_id = %result.request_id, queue = RESULT_QUEUE, "Result published");
        Ok(())
    }
}
