// Matcher constants (no magic values in the loop)
use std::time::Duration;

/// Unacked deliveries the broker may hand one consumer at a time.
/// One at a time keeps dispatch fair: no worker hoards backlog while
/// siblings starve.
pub const PREFETCH_COUNT: u16 = 1;

/// Delivery attempts (first delivery + redeliveries) before a
/// transiently failing request is dead-lettered instead of requeued
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Pause before nacking a transiently failed delivery, so a down
/// dependency is not hammered by an instant redeliver loop (50ms)
pub const TRANSIENT_NACK_DELAY: Duration = Duration::from_millis(50);

/// Sleep after an unexpected worker error before the loop continues (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);
