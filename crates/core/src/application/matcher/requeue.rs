// Requeue policy for transient failures
//
// The broker redelivers on nack, so without a bound a permanently failing
// request would loop forever. The policy caps delivery attempts and routes
// the message to the dead-letter queue at the cap.

use super::constants::MAX_DELIVERY_ATTEMPTS;
use tracing::warn;

/// Decision for a delivery that failed transiently
#[derive(Debug, PartialEq, Eq)]
pub enum RequeueDecision {
    /// Nack with requeue; the broker redelivers to some live worker
    Requeue,
    /// Attempt cap reached; reject to the dead-letter queue
    DeadLetter,
}

pub struct RequeuePolicy {
    max_attempts: u32,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self::new(MAX_DELIVERY_ATTEMPTS)
    }
}

impl RequeuePolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// `attempt` is the current delivery attempt (1 = first delivery)
    pub fn decide(&self, attempt: u32) -> RequeueDecision {
        if attempt >= self.max_attempts {
            warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                "Delivery attempt cap reached, dead-lettering"
            );
            return RequeueDecision::DeadLetter;
        }
        RequeueDecision::Requeue
    }
}
