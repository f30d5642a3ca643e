// Broker Ports (competing-consumer dispatch protocol)
//
// The request queue and result queue are the only shared mutable resources
// in the system; all mutation is mediated by the broker's delivery and
// acknowledgment protocol. No shared-memory locking between workers.

use crate::domain::{MatchResult, RideRequest};
use crate::error::Result;
use async_trait::async_trait;

/// One delivery attempt of a queued message.
///
/// Carries the raw payload plus the broker metadata the dispatch protocol
/// needs: the tag for ack/nack, the redelivered flag, and the attempt
/// count (1 for the first delivery) used by the requeue policy.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub redelivered: bool,
    /// Delivery attempts including this one
    pub attempt: u32,
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Decode the payload as a RideRequest. A decode failure is a
    /// permanent failure: the message belongs on the dead-letter path.
    pub fn decode_request(&self) -> std::result::Result<RideRequest, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// Decode the payload as a MatchResult (DB worker side)
    pub fn decode_result(&self) -> std::result::Result<MatchResult, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

/// Producer-side publish with confirm semantics.
///
/// `publish_confirmed` returns only once the broker has the message
/// durably; on connection failure it returns `AppError::BrokerUnavailable`
/// and the caller retries. No local buffering masks broker outages.
#[async_trait]
pub trait RequestPublisher: Send + Sync {
    async fn publish_confirmed(&self, request: &RideRequest) -> Result<()>;
}

/// Consumer handle onto the shared request queue.
///
/// One handle per worker instance. The broker hands each handle at most
/// one unacknowledged delivery at a time (prefetch = 1), which is the
/// system's sole load-balancing mechanism.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Block until the broker delivers one message.
    ///
    /// Cancel safe: a cancelled fetch leaves the message with the broker
    /// for redelivery to another consumer.
    async fn fetch(&self) -> Result<Delivery>;

    /// Acknowledge: removes the message from the queue permanently
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Negative-acknowledge with requeue, for transient failures
    async fn nack_requeue(&self, delivery: &Delivery) -> Result<()>;

    /// Reject without requeue; the broker routes the message to the
    /// dead-letter queue for manual inspection
    async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()>;
}

/// Matcher-side publish of results, confirm-before-return.
///
/// Ordering contract: the worker acks the request only after this
/// publish has been confirmed.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish_confirmed(&self, result: &MatchResult) -> Result<()>;
}

/// Consumer handle onto the result queue (DB worker side). Same
/// fetch/ack shape and guarantees as `RequestQueue`.
#[async_trait]
pub trait ResultQueue: Send + Sync {
    async fn fetch(&self) -> Result<Delivery>;
    async fn ack(&self, delivery: &Delivery) -> Result<()>;
    async fn nack_requeue(&self, delivery: &Delivery) -> Result<()>;
    async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Poll interval while a queue is empty
    const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// One queued message: (attempt number of the next delivery, payload)
    type QueuedMessage = (u32, Vec<u8>);

    #[derive(Default)]
    struct QueueState {
        ready: VecDeque<QueuedMessage>,
        unacked: HashMap<u64, QueuedMessage>,
        dead: Vec<Vec<u8>>,
    }

    impl QueueState {
        fn requeue_unacked(&mut self) -> usize {
            let orphans: Vec<u64> = self.unacked.keys().copied().collect();
            for tag in &orphans {
                if let Some((attempt, payload)) = self.unacked.remove(tag) {
                    // Redelivery bumps the attempt count
                    self.ready.push_back((attempt + 1, payload));
                }
            }
            orphans.len()
        }
    }

    struct BrokerInner {
        requests: Mutex<QueueState>,
        results: Mutex<QueueState>,
        next_tag: AtomicU64,
        down: AtomicBool,
        results_published: AtomicU64,
    }

    /// In-memory stand-in for the broker.
    ///
    /// Models exactly the guarantees the protocol relies on: per-message
    /// acknowledgment, requeue on nack, dead-letter on reject, at most one
    /// unacked delivery per consumer handle, and redelivery of unacked
    /// messages after a simulated consumer crash.
    #[derive(Clone)]
    pub struct InMemoryBroker {
        inner: Arc<BrokerInner>,
    }

    impl Default for InMemoryBroker {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryBroker {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(BrokerInner {
                    requests: Mutex::new(QueueState::default()),
                    results: Mutex::new(QueueState::default()),
                    next_tag: AtomicU64::new(1),
                    down: AtomicBool::new(false),
                    results_published: AtomicU64::new(0),
                }),
            }
        }

        /// New consumer handle onto the request queue (one per worker)
        pub fn request_consumer(&self) -> InMemoryRequestConsumer {
            InMemoryRequestConsumer {
                inner: Arc::clone(&self.inner),
                held: Mutex::new(None),
            }
        }

        /// New consumer handle onto the result queue (DB worker side)
        pub fn result_consumer(&self) -> InMemoryResultConsumer {
            InMemoryResultConsumer {
                inner: Arc::clone(&self.inner),
                held: Mutex::new(None),
            }
        }

        /// Simulate a broker outage: publishes fail until restored
        pub fn set_down(&self, down: bool) {
            self.inner.down.store(down, Ordering::SeqCst);
        }

        /// Publish raw bytes onto the request queue, bypassing
        /// serialization. For malformed-payload tests.
        pub fn publish_raw_request(&self, payload: Vec<u8>) {
            let mut q = self.inner.requests.lock().unwrap();
            q.ready.push_back((1, payload));
        }

        /// Raw-bytes counterpart for the result queue
        pub fn publish_raw_result(&self, payload: Vec<u8>) {
            let mut q = self.inner.results.lock().unwrap();
            q.ready.push_back((1, payload));
        }

        pub fn dead_lettered_results(&self) -> Vec<Vec<u8>> {
            self.inner.results.lock().unwrap().dead.clone()
        }

        /// Return all unacked messages (on either queue) to the ready
        /// queue, as the broker does after a consumer dies holding them.
        pub fn requeue_unacked(&self) -> usize {
            let mut n = self.inner.requests.lock().unwrap().requeue_unacked();
            n += self.inner.results.lock().unwrap().requeue_unacked();
            n
        }

        pub fn pending_requests(&self) -> usize {
            self.inner.requests.lock().unwrap().ready.len()
        }

        pub fn unacked_requests(&self) -> usize {
            self.inner.requests.lock().unwrap().unacked.len()
        }

        pub fn dead_lettered_requests(&self) -> Vec<Vec<u8>> {
            self.inner.requests.lock().unwrap().dead.clone()
        }

        /// Total results ever published (confirmed), including any a
        /// DB worker has since consumed
        pub fn results_published(&self) -> u64 {
            self.inner.results_published.load(Ordering::SeqCst)
        }

        fn publish(&self, side: Side, payload: Vec<u8>) -> Result<()> {
            if self.inner.down.load(Ordering::SeqCst) {
                return Err(AppError::BrokerUnavailable(
                    "simulated broker outage".to_string(),
                ));
            }
            let queue = match side {
                Side::Requests => &self.inner.requests,
                Side::Results => &self.inner.results,
            };
            queue.lock().unwrap().ready.push_back((1, payload));
            if matches!(side, Side::Results) {
                self.inner.results_published.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[derive(Clone, Copy)]
    enum Side {
        Requests,
        Results,
    }

    #[async_trait]
    impl RequestPublisher for InMemoryBroker {
        async fn publish_confirmed(&self, request: &RideRequest) -> Result<()> {
            let payload = serde_json::to_vec(request)?;
            self.publish(Side::Requests, payload)
        }
    }

    #[async_trait]
    impl ResultSink for InMemoryBroker {
        async fn publish_confirmed(&self, result: &MatchResult) -> Result<()> {
            let payload = serde_json::to_vec(result)?;
            self.publish(Side::Results, payload)
        }
    }

    /// Shared fetch/ack machinery for both queue sides.
    ///
    /// `held` enforces prefetch = 1: a handle that already holds an
    /// unacked delivery waits until that delivery is settled before the
    /// broker hands it another one.
    fn try_fetch(
        inner: &BrokerInner,
        side: Side,
        held: &Mutex<Option<u64>>,
    ) -> Option<Delivery> {
        if held.lock().unwrap().is_some() {
            return None;
        }
        let queue = match side {
            Side::Requests => &inner.requests,
            Side::Results => &inner.results,
        };
        let mut q = queue.lock().unwrap();
        let (attempt, payload) = q.ready.pop_front()?;
        let tag = inner.next_tag.fetch_add(1, Ordering::SeqCst);
        q.unacked.insert(tag, (attempt, payload.clone()));
        *held.lock().unwrap() = Some(tag);
        Some(Delivery {
            delivery_tag: tag,
            redelivered: attempt > 1,
            attempt,
            payload,
        })
    }

    fn settle(
        inner: &BrokerInner,
        side: Side,
        held: &Mutex<Option<u64>>,
        delivery: &Delivery,
        disposition: Disposition,
    ) -> Result<()> {
        let queue = match side {
            Side::Requests => &inner.requests,
            Side::Results => &inner.results,
        };
        let mut q = queue.lock().unwrap();
        let entry = q.unacked.remove(&delivery.delivery_tag).ok_or_else(|| {
            AppError::Internal(format!(
                "unknown delivery tag {} (double settle?)",
                delivery.delivery_tag
            ))
        })?;
        match disposition {
            Disposition::Ack => {}
            Disposition::Requeue => {
                let (attempt, payload) = entry;
                q.ready.push_back((attempt + 1, payload));
            }
            Disposition::DeadLetter => {
                q.dead.push(entry.1);
            }
        }
        let mut h = held.lock().unwrap();
        if *h == Some(delivery.delivery_tag) {
            *h = None;
        }
        Ok(())
    }

    enum Disposition {
        Ack,
        Requeue,
        DeadLetter,
    }

    pub struct InMemoryRequestConsumer {
        inner: Arc<BrokerInner>,
        held: Mutex<Option<u64>>,
    }

    #[async_trait]
    impl RequestQueue for InMemoryRequestConsumer {
        async fn fetch(&self) -> Result<Delivery> {
            loop {
                if let Some(d) = try_fetch(&self.inner, Side::Requests, &self.held) {
                    return Ok(d);
                }
                tokio::time::sleep(EMPTY_POLL_INTERVAL).await;
            }
        }

        async fn ack(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Requests, &self.held, delivery, Disposition::Ack)
        }

        async fn nack_requeue(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Requests, &self.held, delivery, Disposition::Requeue)
        }

        async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Requests, &self.held, delivery, Disposition::DeadLetter)
        }
    }

    pub struct InMemoryResultConsumer {
        inner: Arc<BrokerInner>,
        held: Mutex<Option<u64>>,
    }

    #[async_trait]
    impl ResultQueue for InMemoryResultConsumer {
        async fn fetch(&self) -> Result<Delivery> {
            loop {
                if let Some(d) = try_fetch(&self.inner, Side::Results, &self.held) {
                    return Ok(d);
                }
                tokio::time::sleep(EMPTY_POLL_INTERVAL).await;
            }
        }

        async fn ack(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Results, &self.held, delivery, Disposition::Ack)
        }

        async fn nack_requeue(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Results, &self.held, delivery, Disposition::Requeue)
        }

        async fn reject_dead_letter(&self, delivery: &Delivery) -> Result<()> {
            settle(&self.inner, Side::Results, &self.held, delivery, Disposition::DeadLetter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::InMemoryBroker;
    use super::*;
    use crate::domain::GeoPoint;
    use crate::domain::RideRequest;

    fn request() -> RideRequest {
        RideRequest::new_test(GeoPoint::new(1.0, 2.0), GeoPoint::new(3.0, 4.0))
    }

    #[tokio::test]
    async fn publish_fetch_ack_removes_message() {
        let broker = InMemoryBroker::new();
        RequestPublisher::publish_confirmed(&broker, &request())
            .await
            .unwrap();

        let consumer = broker.request_consumer();
        let delivery = consumer.fetch().await.unwrap();
        assert_eq!(delivery.attempt, 1);
        assert!(!delivery.redelivered);
        assert_eq!(broker.unacked_requests(), 1);

        consumer.ack(&delivery).await.unwrap();
        assert_eq!(broker.pending_requests(), 0);
        assert_eq!(broker.unacked_requests(), 0);
    }

    #[tokio::test]
    async fn nack_requeues_with_bumped_attempt() {
        let broker = InMemoryBroker::new();
        RequestPublisher::publish_confirmed(&broker, &request())
            .await
            .unwrap();

        let consumer = broker.request_consumer();
        let first = consumer.fetch().await.unwrap();
        consumer.nack_requeue(&first).await.unwrap();

        let second = consumer.fetch().await.unwrap();
        assert_eq!(second.attempt, 2);
        assert!(second.redelivered);
        consumer.ack(&second).await.unwrap();
    }

    #[tokio::test]
    async fn reject_routes_to_dead_letter() {
        let broker = InMemoryBroker::new();
        broker.publish_raw_request(b"not json".to_vec());

        let consumer = broker.request_consumer();
        let delivery = consumer.fetch().await.unwrap();
        consumer.reject_dead_letter(&delivery).await.unwrap();

        assert_eq!(broker.dead_lettered_requests().len(), 1);
        assert_eq!(broker.pending_requests(), 0);
    }

    #[tokio::test]
    async fn publish_fails_while_broker_down() {
        let broker = InMemoryBroker::new();
        broker.set_down(true);
        let err = RequestPublisher::publish_confirmed(&broker, &request())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::BrokerUnavailable(_)));

        broker.set_down(false);
        RequestPublisher::publish_confirmed(&broker, &request())
            .await
            .unwrap();
        assert_eq!(broker.pending_requests(), 1);
    }

    #[tokio::test]
    async fn crash_simulation_redelivers_unacked() {
        let broker = InMemoryBroker::new();
        RequestPublisher::publish_confirmed(&broker, &request())
            .await
            .unwrap();

        let dead_consumer = broker.request_consumer();
        let _held = dead_consumer.fetch().await.unwrap();
        drop(dead_consumer); // consumer dies holding the delivery

        assert_eq!(broker.requeue_unacked(), 1);
        let survivor = broker.request_consumer();
        let redelivery = survivor.fetch().await.unwrap();
        assert!(redelivery.redelivered);
        assert_eq!(redelivery.attempt, 2);
    }
}
