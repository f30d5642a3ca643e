// DB Writer - result-queue consumer
//
// Mirrors the matcher's ack-after-durability rule on the result side:
// a result message is acknowledged only after the durable write, so a
// crash mid-write redelivers and the idempotent upsert absorbs it.

use crate::application::matcher::constants::{ERROR_RECOVERY_SLEEP_DURATION, TRANSIENT_NACK_DELAY};
use crate::application::matcher::{RequeueDecision, RequeuePolicy, ShutdownToken};
use crate::error::Result;
use crate::port::{Delivery, MatchResultRepository, ResultQueue};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Outcome of one fetch/persist/ack cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted,
    DeadLettered,
    Requeued,
    Interrupted,
}

pub struct DbWriter {
    results: Arc<dyn ResultQueue>,
    repository: Arc<dyn MatchResultRepository>,
    requeue_policy: RequeuePolicy,
}

impl DbWriter {
    pub fn new(
        results: Arc<dyn ResultQueue>,
        repository: Arc<dyn MatchResultRepository>,
        requeue_policy: RequeuePolicy,
    ) -> Self {
        Self {
            results,
            repository,
            requeue_policy,
        }
    }

    /// Run the writer loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("DB writer started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next(&mut shutdown).await {
                Ok(WriteOutcome::Interrupted) => break,
                Ok(outcome) => {
                    debug!(outcome = ?outcome, "Write cycle finished");
                }
                Err(e) => {
                    error!(error = %e, "DB writer cycle error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {}
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!("DB writer stopped");
        Ok(())
    }

    /// One cycle: fetch, persist, ack
    pub async fn process_next(&self, shutdown: &mut ShutdownToken) -> Result<WriteOutcome> {
        let delivery = tokio::select! {
            fetched = self.results.fetch() => fetched?,
            _ = shutdown.wait() => return Ok(WriteOutcome::Interrupted),
        };
        self.handle_delivery(delivery).await
    }

    async fn handle_delivery(&self, delivery: Delivery) -> Result<WriteOutcome> {
        let result = match delivery.decode_result() {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Undecodable result, dead-lettering");
                self.results.reject_dead_letter(&delivery).await?;
                return Ok(WriteOutcome::DeadLettered);
            }
        };

        // Ack only after the durable write
        if let Err(e) = self.repository.upsert(&result).await {
            return match self.requeue_policy.decide(delivery.attempt) {
                RequeueDecision::Requeue => {
                    warn!(
                        request_id = %result.request_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Result write failed, requeueing"
                    );
                    sleep(TRANSIENT_NACK_DELAY).await;
                    self.results.nack_requeue(&delivery).await?;
                    Ok(WriteOutcome::Requeued)
                }
                RequeueDecision::DeadLetter => {
                    error!(
                        request_id = %result.request_id,
                        attempt = delivery.attempt,
                        error = %e,
                        "Result write failed at attempt cap, dead-lettering"
                    );
                    self.results.reject_dead_letter(&delivery).await?;
                    Ok(WriteOutcome::DeadLettered)
                }
            };
        }

        self.results.ack(&delivery).await?;
        debug!(request_id = %result.request_id, "Result persisted");
        Ok(WriteOutcome::Persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::matcher::shutdown_channel;
    use crate::domain::MatchResult;
    use crate::port::broker::mocks::InMemoryBroker;
    use crate::port::result_repository::mocks::InMemoryMatchResultRepository;
    use crate::port::ResultSink;

    fn writer(broker: &InMemoryBroker, repo: Arc<InMemoryMatchResultRepository>) -> DbWriter {
        DbWriter::new(
            Arc::new(broker.result_consumer()),
            repo,
            RequeuePolicy::default(),
        )
    }

    async fn one_cycle(writer: &DbWriter) -> WriteOutcome {
        let (_tx, mut shutdown) = shutdown_channel();
        writer.process_next(&mut shutdown).await.unwrap()
    }

    #[tokio::test]
    async fn persists_and_acks_result() {
        let broker = InMemoryBroker::new();
        let repo = Arc::new(InMemoryMatchResultRepository::new());
        let w = writer(&broker, repo.clone());

        let result = MatchResult::matched("req-1", "drv-1", "C1", 1000);
        ResultSink::publish_confirmed(&broker, &result).await.unwrap();

        assert_eq!(one_cycle(&w).await, WriteOutcome::Persisted);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn duplicate_published_result_persists_once() {
        let broker = InMemoryBroker::new();
        let repo = Arc::new(InMemoryMatchResultRepository::new());
        let w = writer(&broker, repo.clone());

        // Crash window between publish-confirm and ack can duplicate the
        // published result; the upsert keyed by request_id absorbs it.
        let result = MatchResult::matched("req-1", "drv-1", "C1", 1000);
        ResultSink::publish_confirmed(&broker, &result).await.unwrap();
        ResultSink::publish_confirmed(&broker, &result).await.unwrap();

        assert_eq!(one_cycle(&w).await, WriteOutcome::Persisted);
        assert_eq!(one_cycle(&w).await, WriteOutcome::Persisted);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn undecodable_result_is_dead_lettered() {
        let broker = InMemoryBroker::new();
        let repo = Arc::new(InMemoryMatchResultRepository::new());
        let w = writer(&broker, repo.clone());

        broker.publish_raw_result(b"<binary junk>".to_vec());

        assert_eq!(one_cycle(&w).await, WriteOutcome::DeadLettered);
        assert_eq!(broker.dead_lettered_results().len(), 1);
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
