// Matcher Worker - competing-consumer dispatch loop
//
// One of N identically-coded, independently-scaled instances. Each pulls
// ride requests from the shared queue (prefetch = 1), matches against the
// driver directory, publishes the result with confirm semantics and only
// then acknowledges the request. Identity is observability metadata; the
// broker's fair dispatch is the only load balancing.

pub mod constants;
mod requeue;
mod shutdown;

#[cfg(test)]
mod cycle_test;

pub use requeue::{RequeueDecision, RequeuePolicy};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::domain::{MatchResult, RideRequest, UnmatchedReason, WorkerIdentity, WorkerState};
use crate::error::Result;
use crate::port::{Delivery, DriverDirectory, ProcessedMarkers, RequestQueue, ResultSink, TimeProvider};
use constants::{ERROR_RECOVERY_SLEEP_DURATION, TRANSIENT_NACK_DELAY};
use std::sync::{Arc, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Outcome of one fetch/match/publish/ack cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Result published and request acked
    Completed,
    /// Idempotency check hit: acked without publishing a second result
    Duplicate,
    /// Permanent failure: delivery rejected to the dead-letter queue
    DeadLettered,
    /// Transient failure: delivery returned to the queue for another attempt
    Requeued,
    /// Shutdown signalled while waiting for a delivery
    Interrupted,
}

/// Failure mode of the match step, driving the ack decision
#[derive(Debug)]
enum MatchFailure {
    /// Dependency unreachable; nack-with-requeue (bounded by policy)
    Transient(String),
    /// Unprocessable request; ack via the dead-letter path
    Permanent(String),
}

pub struct MatcherWorker {
    identity: WorkerIdentity,
    requests: Arc<dyn RequestQueue>,
    results: Arc<dyn ResultSink>,
    drivers: Arc<dyn DriverDirectory>,
    markers: Arc<dyn ProcessedMarkers>,
    requeue_policy: RequeuePolicy,
    time_provider: Arc<dyn TimeProvider>,
    state: Mutex<WorkerState>,
}

impl MatcherWorker {
    pub fn new(
        identity: WorkerIdentity,
        requests: Arc<dyn RequestQueue>,
        results: Arc<dyn ResultSink>,
        drivers: Arc<dyn DriverDirectory>,
        markers: Arc<dyn ProcessedMarkers>,
        requeue_policy: RequeuePolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            identity,
            requests,
            results,
            drivers,
            markers,
            requeue_policy,
            time_provider,
            state: Mutex::new(WorkerState::Idle),
        }
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Current cycle state (observability)
    pub fn current_state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    fn enter(&self, next: WorkerState) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        *state = state.transition(next)?;
        debug!(consumer_id = %self.identity, state = %next, "State transition");
        Ok(())
    }

    /// Run the worker loop with graceful shutdown support.
    ///
    /// A shutdown observed while fetching exits immediately; a shutdown
    /// observed with a delivery in flight lets the cycle finish first.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(consumer_id = %self.identity, "Matcher worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next(&mut shutdown).await {
                Ok(CycleOutcome::Interrupted) => break,
                Ok(outcome) => {
                    debug!(consumer_id = %self.identity, outcome = ?outcome, "Cycle finished");
                }
                Err(e) => {
                    // The delivery (if any) stays unacked; the broker
                    // redelivers it after the visibility timeout.
                    error!(consumer_id = %self.identity, error = %e, "Worker cycle error");
                    *self.state.lock().unwrap() = WorkerState::Idle;
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {}
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        self.enter(WorkerState::ShuttingDown)?;
        info!(consumer_id = %self.identity, "Matcher worker stopped");
        Ok(())
    }

    /// One cycle: fetch, match, publish, ack
    pub async fn process_next(&self, shutdown: &mut ShutdownToken) -> Result<CycleOutcome> {
        self.enter(WorkerState::Fetching)?;
        let delivery = tokio::select! {
            fetched = self.requests.fetch() => fetched?,
            _ = shutdown.wait() => {
                self.enter(WorkerState::Idle)?;
                return Ok(CycleOutcome::Interrupted);
            }
        };

        // From here the cycle runs to completion: a held delivery is
        // always acked, requeued or dead-lettered before returning.
        let outcome = self.handle_delivery(delivery).await?;
        self.enter(WorkerState::Idle)?;
        Ok(outcome)
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<CycleOutcome> {
        self.enter(WorkerState::Matching)?;

        let request = match delivery.decode_request() {
            Ok(request) => request,
            Err(e) => {
                warn!(consumer_id = %self.identity, error = %e, "Undecodable request, dead-lettering");
                self.enter(WorkerState::Acking)?;
                self.requests.reject_dead_letter(&delivery).await?;
                return Ok(CycleOutcome::DeadLettered);
            }
        };

        // Idempotency check keyed by request_id: redelivery after a crash
        // between publish-confirm and ack lands here.
        if self.markers.is_processed(&request.request_id).await? {
            info!(
                consumer_id = %self.identity,
                request_id = %request.request_id,
                "Duplicate delivery, acking without a second result"
            );
            self.enter(WorkerState::Acking)?;
            self.requests.ack(&delivery).await?;
            return Ok(CycleOutcome::Duplicate);
        }

        let result = match self.match_request(&request).await {
            Ok(result) => result,
            Err(MatchFailure::Permanent(reason)) => {
                warn!(
                    consumer_id = %self.identity,
                    request_id = %request.request_id,
                    reason = %reason,
                    "Unprocessable request, dead-lettering"
                );
                self.enter(WorkerState::Acking)?;
                self.requests.reject_dead_letter(&delivery).await?;
                return Ok(CycleOutcome::DeadLettered);
            }
            Err(MatchFailure::Transient(reason)) => {
                return self.requeue_or_dead_letter(&delivery, &request.request_id, &reason).await;
            }
        };

        // Ordering contract: ack only after the result publish is
        // confirmed, otherwise a crash between the two loses the result.
        self.enter(WorkerState::Publishing)?;
        if let Err(e) = self.results.publish_confirmed(&result).await {
            if let Some(driver_id) = &result.driver_id {
                if let Err(release_err) = self.drivers.release(driver_id).await {
                    warn!(driver_id = %driver_id, error = %release_err, "Driver release failed");
                }
            }
            return self
                .requeue_or_dead_letter(&delivery, &request.request_id, &e.to_string())
                .await;
        }

        // Marker before ack: a crash in the remaining window causes one
        // redundant published result, deduped downstream by request_id.
        self.markers
            .mark_processed(&request.request_id, self.identity.as_str())
            .await?;

        self.enter(WorkerState::Acking)?;
        self.requests.ack(&delivery).await?;

        info!(
            consumer_id = %self.identity,
            request_id = %request.request_id,
            matched = result.matched,
            attempt = delivery.attempt,
            "Request processed"
        );
        Ok(CycleOutcome::Completed)
    }

    /// The matching step. No driver available is a result, not a failure.
    async fn match_request(
        &self,
        request: &RideRequest,
    ) -> std::result::Result<MatchResult, MatchFailure> {
        if !request.rider_location.is_finite() || !request.destination.is_finite() {
            return Err(MatchFailure::Permanent("non-finite coordinates".to_string()));
        }

        let matched_at = self.time_provider.now_millis();
        match self.drivers.reserve_nearest(&request.rider_location).await {
            Ok(Some(driver_id)) => Ok(MatchResult::matched(
                request.request_id.clone(),
                driver_id,
                self.identity.as_str(),
                matched_at,
            )),
            Ok(None) => Ok(MatchResult::unmatched(
                request.request_id.clone(),
                UnmatchedReason::NoDriverAvailable,
                self.identity.as_str(),
                matched_at,
            )),
            Err(e) => Err(MatchFailure::Transient(e.to_string())),
        }
    }

    async fn requeue_or_dead_letter(
        &self,
        delivery: &Delivery,
        request_id: &str,
        reason: &str,
    ) -> Result<CycleOutcome> {
        match self.requeue_policy.decide(delivery.attempt) {
            RequeueDecision::Requeue => {
                warn!(
                    consumer_id = %self.identity,
                    request_id = %request_id,
                    attempt = delivery.attempt,
                    reason = %reason,
                    "Transient failure, requeueing"
                );
                // Brief pause so a down dependency is not hammered
                sleep(TRANSIENT_NACK_DELAY).await;
                self.enter(WorkerState::Acking)?;
                self.requests.nack_requeue(delivery).await?;
                Ok(CycleOutcome::Requeued)
            }
            RequeueDecision::DeadLetter => {
                error!(
                    consumer_id = %self.identity,
                    request_id = %request_id,
                    attempt = delivery.attempt,
                    reason = %reason,
                    "Attempt cap reached, dead-lettering"
                );
                self.enter(WorkerState::Acking)?;
                self.requests.reject_dead_letter(delivery).await?;
                Ok(CycleOutcome::DeadLettered)
            }
        }
    }
}
