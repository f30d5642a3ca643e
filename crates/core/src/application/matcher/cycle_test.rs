// Matcher cycle tests against in-memory ports

use super::*;
use crate::domain::GeoPoint;
use crate::port::broker::mocks::InMemoryBroker;
use crate::port::dedup::mocks::InMemoryProcessedMarkers;
use crate::port::driver_directory::mocks::InMemoryDriverDirectory;
use crate::port::time_provider::mocks::FixedTimeProvider;
use crate::port::RequestPublisher;

struct Fixture {
    broker: InMemoryBroker,
    drivers: Arc<InMemoryDriverDirectory>,
    markers: Arc<InMemoryProcessedMarkers>,
    worker: MatcherWorker,
}

fn fixture_with_policy(policy: RequeuePolicy) -> Fixture {
    let broker = InMemoryBroker::new();
    let drivers = Arc::new(InMemoryDriverDirectory::new());
    let markers = Arc::new(InMemoryProcessedMarkers::new());
    let worker = MatcherWorker::new(
        WorkerIdentity::new("C1"),
        Arc::new(broker.request_consumer()),
        Arc::new(broker.clone()),
        drivers.clone(),
        markers.clone(),
        policy,
        Arc::new(FixedTimeProvider::new(1_000)),
    );
    Fixture {
        broker,
        drivers,
        markers,
        worker,
    }
}

fn fixture() -> Fixture {
    fixture_with_policy(RequeuePolicy::default())
}

async fn publish_request(broker: &InMemoryBroker) -> RideRequest {
    let request = RideRequest::new_test(GeoPoint::new(59.91, 10.75), GeoPoint::new(59.95, 10.60));
    RequestPublisher::publish_confirmed(broker, &request)
        .await
        .unwrap();
    request
}

async fn run_one_cycle(worker: &MatcherWorker) -> CycleOutcome {
    let (_tx, mut shutdown) = shutdown_channel();
    worker.process_next(&mut shutdown).await.unwrap()
}

#[tokio::test]
async fn completed_cycle_publishes_result_and_acks() {
    let f = fixture();
    f.drivers.add_driver("drv-1", GeoPoint::new(59.91, 10.75));
    let request = publish_request(&f.broker).await;

    let outcome = run_one_cycle(&f.worker).await;

    assert_eq!(outcome, CycleOutcome::Completed);
    assert_eq!(f.broker.results_published(), 1);
    assert_eq!(f.broker.pending_requests(), 0);
    assert_eq!(f.broker.unacked_requests(), 0);
    assert!(f.markers.is_processed(&request.request_id).await.unwrap());
    assert_eq!(f.worker.current_state(), WorkerState::Idle);
}

#[tokio::test]
async fn no_driver_yields_unmatched_result_not_retry() {
    let f = fixture();
    publish_request(&f.broker).await;

    let outcome = run_one_cycle(&f.worker).await;

    assert_eq!(outcome, CycleOutcome::Completed);
    assert_eq!(f.broker.results_published(), 1);

    let consumer = f.broker.result_consumer();
    let delivery = crate::port::ResultQueue::fetch(&consumer).await.unwrap();
    let result = delivery.decode_result().unwrap();
    assert!(!result.matched);
    assert_eq!(result.reason, Some(UnmatchedReason::NoDriverAvailable));
    assert_eq!(result.consumer_id, "C1");
}

#[tokio::test]
async fn duplicate_delivery_acks_without_second_result() {
    let f = fixture();
    f.drivers.add_driver("drv-1", GeoPoint::new(59.91, 10.75));
    let request = publish_request(&f.broker).await;

    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Completed);

    // Redelivery of the same request_id (crash-before-ack scenario)
    RequestPublisher::publish_confirmed(&f.broker, &request)
        .await
        .unwrap();
    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Duplicate);

    assert_eq!(f.broker.results_published(), 1);
    assert_eq!(f.broker.pending_requests(), 0);
}

#[tokio::test]
async fn undecodable_payload_is_dead_lettered() {
    let f = fixture();
    f.broker.publish_raw_request(b"{ not json".to_vec());

    let outcome = run_one_cycle(&f.worker).await;

    assert_eq!(outcome, CycleOutcome::DeadLettered);
    assert_eq!(f.broker.dead_lettered_requests().len(), 1);
    assert_eq!(f.broker.results_published(), 0);
}

#[tokio::test]
async fn non_finite_coordinates_are_permanent() {
    let f = fixture();
    f.drivers.add_driver("drv-1", GeoPoint::new(59.91, 10.75));
    // 1e999 overflows f64 to infinity on parse; the request decodes but
    // fails the finite-coordinate check and must not consume a driver
    f.broker.publish_raw_request(
        br#"{"request_id":"req-inf","rider_location":{"lat":1e999,"lon":10.75},"destination":{"lat":59.95,"lon":10.60},"requested_at":1000}"#
            .to_vec(),
    );

    let outcome = run_one_cycle(&f.worker).await;
    assert_eq!(outcome, CycleOutcome::DeadLettered);
    assert_eq!(f.broker.dead_lettered_requests().len(), 1);
    assert_eq!(f.drivers.available_count(), 1);
    assert_eq!(f.broker.results_published(), 0);
}

#[tokio::test]
async fn transient_directory_failure_requeues_then_succeeds() {
    let f = fixture();
    f.drivers.add_driver("drv-1", GeoPoint::new(59.91, 10.75));
    f.drivers.fail_next(1);
    publish_request(&f.broker).await;

    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Requeued);
    assert_eq!(f.broker.pending_requests(), 1);
    assert_eq!(f.broker.results_published(), 0);

    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Completed);
    assert_eq!(f.broker.results_published(), 1);
}

#[tokio::test]
async fn attempt_cap_dead_letters_transient_failures() {
    let f = fixture_with_policy(RequeuePolicy::new(2));
    f.drivers.fail_next(10);
    publish_request(&f.broker).await;

    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Requeued);
    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::DeadLettered);
    assert_eq!(f.broker.dead_lettered_requests().len(), 1);
    assert_eq!(f.broker.pending_requests(), 0);
}

#[tokio::test]
async fn publish_failure_requeues_and_releases_driver() {
    let f = fixture();
    f.drivers.add_driver("drv-1", GeoPoint::new(59.91, 10.75));
    let request = publish_request(&f.broker).await;

    // Request fetch works (already queued), result publish fails
    f.broker.set_down(true);
    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Requeued);

    // Not acked, not marked processed, driver back in the pool
    assert_eq!(f.broker.pending_requests(), 1);
    assert!(!f.markers.is_processed(&request.request_id).await.unwrap());
    assert_eq!(f.drivers.available_count(), 1);

    f.broker.set_down(false);
    assert_eq!(run_one_cycle(&f.worker).await, CycleOutcome::Completed);
    assert_eq!(f.broker.results_published(), 1);
}

#[tokio::test]
async fn shutdown_during_fetch_interrupts_cleanly() {
    let f = fixture();
    let (tx, mut shutdown) = shutdown_channel();

    let signal = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        tx.shutdown();
    });

    let outcome = f.worker.process_next(&mut shutdown).await.unwrap();
    assert_eq!(outcome, CycleOutcome::Interrupted);
    assert_eq!(f.worker.current_state(), WorkerState::Idle);
    signal.await.unwrap();
}
