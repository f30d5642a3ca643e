// Manual-Ack Consumers (prefetch = 1)
//
// One consumer handle per process. basic_qos(1) makes the broker hand
// this consumer at most one unacknowledged delivery at a time, which is
// what keeps dispatch fair across however many workers are running.

use crate::map_lapin_error;
use crate::topology::{REQUEST_QUEUE, RESULT_QUEUE};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use ridematch_core::application::matcher::constants::PREFETCH_COUNT;
use ridematch_core::port::{Delivery, RequestQueue, ResultQueue};
use ridematch_core::{AppError, Result};
use tokio::sync::Mutex;
use tracing::debug;

/// Delivery attempt number, 1-based.
///
/// Quorum queues track prior deliveries in `x-delivery-count`; classic
/// queues only expose the redelivered flag, so the best available lower
/// bound there is 2.
fn delivery_attempt(delivery: &lapin::message::Delivery) -> u32 {
    let header_count = delivery.properties.headers().as_ref().and_then(|headers| {
        headers
            .inner()
            .iter()
            .find(|(key, _)| key.as_str() == "x-delivery-count")
            .and_then(|(_, value)| match value {
                AMQPValue::LongLongInt(n) => Some(*n as u32),
                AMQPValue::LongInt(n) => Some(*n as u32),
                AMQPValue::LongUInt(n) => Some(*n),
                AMQPValue::ShortInt(n) => Some(*n as u32),
                _ => None,
            })
    });

    match header_count {
        Some(prior) => prior + 1,
        None if delivery.redelivered => 2,
        None => 1,
    }
}

/// Shared machinery for both queue sides
struct AmqpConsumer {
    channel: Channel,
    consumer: Mutex<lapin::Consumer>,
    queue: &'static str,
}

impl AmqpConsumer {
    async fn bind(channel: Channel, queue: &'static str, consumer_tag: &str) -> Result<Self> {
        channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
            .map_err(|e| map_lapin_error("basic_qos", e))?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(), // manual ack
                FieldTable::default(),
            )
            .await
            .map_err(|e| map_lapin_error("basic_consume", e))?;

        debug!(queue = queue, consumer_tag = consumer_tag, "Consumer bound");
        Ok(Self {
            channel,
            consumer: Mutex::new(consumer),
            queue,
        })
    }

    async fn fetch(&self) -> Result<Delivery> {
        let mut consumer = self.consumer.lock().await;
        match consumer.next().await {
            Some(Ok(delivery)) => Ok(Delivery {
                delivery_tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
                attempt: delivery_attempt(&delivery),
                payload: delivery.data,
            }),
            Some(Err(e)) => Err(map_lapin_error("consume", e)),
            None => Err(AppError::BrokerUnavailable(format!(
                "consumer stream for {} closed",
                self.queue
            ))),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.channel
            .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| map_lapin_error("basic_ack", e))
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> Result<()> {
        self.channel
            .basic_nack(
                delivery.delivery_tag,
                BasicNackOptions {
                    requeue: true,
                    ..BasicNackOptions::default()
                },
            )
            .await
            .map_err(|e| map_lapin_error("basic_nack", e))
    }

    async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()> {
        // requeue=false routes through the queue's dead-letter exchange
        self.channel
            .basic_reject(
                delivery.delivery_tag,
                BasicRejectOptions { requeue: false },
            )
            .await
            .map_err(|e| map_lapin_error("basic_reject", e))
    }
}

/// Matcher-side handle onto `ride_requests`
pub struct AmqpRequestQueue {
    inner: AmqpConsumer,
}

impl AmqpRequestQueue {
    /// `consumer_tag` should be the worker's `CONSUMER_ID` so broker-side
    /// tooling can attribute deliveries to instances
    pub async fn bind(channel: Channel, consumer_tag: &str) -> Result<Self> {
        Ok(Self {
            inner: AmqpConsumer::bind(channel, REQUEST_QUEUE, consumer_tag).await?,
        })
    }
}

#[async_trait]
impl RequestQueue for AmqpRequestQueue {
    async fn fetch(&self) -> Result<Delivery> {
        self.inner.fetch().await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.inner.ack(delivery).await
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> Result<()> {
        self.inner.nack_requeue(delivery).await
    }

    async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()> {
        self.inner.reject_dead_letter(delivery).await
    }
}

/// DB-worker-side handle onto `match_results`
pub struct AmqpResultQueue {
    inner: AmqpConsumer,
}

impl AmqpResultQueue {
    pub async fn bind(channel: Channel, consumer_tag: &str) -> Result<Self> {
        Ok(Self {
            inner: AmqpConsumer::bind(channel, RESULT_QUEUE, consumer_tag).await?,
        })
    }
}

#[async_trait]
impl ResultQueue for AmqpResultQueue {
    async fn fetch(&self) -> Result<Delivery> {
        self.inner.fetch().await
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.inner.ack(delivery).await
    }

    async fn nack_requeue(&self, delivery: &Delivery) -> Result<()> {
        self.inner.nack_requeue(delivery).await
    }

    async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()> {
        self.inner.reject_dead_letter(delivery).await
    }
}
