// Submit Use Case (request producer)

use crate::domain::{GeoPoint, RequestId, RideRequest};
use crate::error::Result;
use crate::port::{IdProvider, RequestPublisher, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw ride request payload at the intake boundary. Field-level
/// validation is the intake surface's job, not the core's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub rider_location: GeoPoint,
    pub destination: GeoPoint,

    #[serde(default)]
    pub priority: Option<i32>,
}

/// Stateless producer: assigns an id, stamps intake time and publishes
/// with confirm semantics. No local queuing - a broker outage surfaces
/// as `BrokerUnavailable` and the caller retries.
pub struct ProducerService {
    publisher: Arc<dyn RequestPublisher>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ProducerService {
    pub fn new(
        publisher: Arc<dyn RequestPublisher>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            publisher,
            id_provider,
            time_provider,
        }
    }

    /// `Submit(request) -> request_id | Error`
    ///
    /// On success the request is durably enqueued at the broker before
    /// this returns.
    pub async fn submit(&self, req: SubmitRequest) -> Result<RequestId> {
        let request_id = self.id_provider.generate_id();
        let requested_at = self.time_provider.now_millis();

        let mut request = RideRequest::new(
            request_id.clone(),
            requested_at,
            req.rider_location,
            req.destination,
        );
        request.priority = req.priority;

        if let Err(e) = self.publisher.publish_confirmed(&request).await {
            warn!(request_id = %request_id, error = %e, "Request publish failed");
            return Err(e);
        }

        debug!(request_id = %request_id, "Request enqueued");
        Ok(request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::port::broker::mocks::InMemoryBroker;
    use crate::port::id_provider::mocks::SequenceIdProvider;
    use crate::port::time_provider::mocks::FixedTimeProvider;

    fn service(broker: &InMemoryBroker) -> ProducerService {
        ProducerService::new(
            Arc::new(broker.clone()),
            Arc::new(SequenceIdProvider::default()),
            Arc::new(FixedTimeProvider::new(1_700_000_000_000)),
        )
    }

    fn submit_request() -> SubmitRequest {
        SubmitRequest {
            rider_location: GeoPoint::new(59.91, 10.75),
            destination: GeoPoint::new(59.95, 10.60),
            priority: None,
        }
    }

    #[tokio::test]
    async fn submit_enqueues_one_message_and_returns_id() {
        let broker = InMemoryBroker::new();
        let producer = service(&broker);

        let id = producer.submit(submit_request()).await.unwrap();
        assert_eq!(id, "seq-1");
        assert_eq!(broker.pending_requests(), 1);

        // The queued payload decodes back to the same request
        let consumer = broker.request_consumer();
        let delivery = crate::port::RequestQueue::fetch(&consumer).await.unwrap();
        let on_wire = delivery.decode_request().unwrap();
        assert_eq!(on_wire.request_id, "seq-1");
        assert_eq!(on_wire.requested_at, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn broker_outage_surfaces_to_caller() {
        let broker = InMemoryBroker::new();
        broker.set_down(true);
        let producer = service(&broker);

        let err = producer.submit(submit_request()).await.unwrap_err();
        assert!(matches!(err, AppError::BrokerUnavailable(_)));
        assert_eq!(broker.pending_requests(), 0); // nothing half-published
    }
}
