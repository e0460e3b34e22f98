//! Shared backoff gate for all workers of a session.
//!
//! The gate holds one deadline, `not_before`. Every request to the service
//! waits for it first, and every throttle signal pushes it later. The deadline
//! only ever moves forward: a short backoff issued after a long one never
//! shortens it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Earliest time the next request may be sent.
///
/// The deadline is stored as nanoseconds past the gate's creation instant so
/// it can be raised with a single `fetch_max`.
#[derive(Debug)]
pub struct RateGate {
    epoch: Instant,
    not_before_nanos: AtomicU64,
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateGate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            not_before_nanos: AtomicU64::new(0),
        }
    }

    /// Current deadline.
    pub fn not_before(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.not_before_nanos.load(Ordering::Acquire))
    }

    /// Time left until the gate opens.
    pub fn remaining(&self) -> Duration {
        self.not_before().saturating_duration_since(Instant::now())
    }

    /// Push the deadline to at least `now + backoff`.
    ///
    /// Returns `true` if the deadline moved later, `false` if an existing
    /// backoff already covers it.
    pub fn extend(&self, backoff: Duration) -> bool {
        let target = Instant::now().saturating_duration_since(self.epoch) + backoff;
        let target = u64::try_from(target.as_nanos()).unwrap_or(u64::MAX);
        let previous = self.not_before_nanos.fetch_max(target, Ordering::AcqRel);
        target > previous
    }

    /// Wait until the gate is open.
    ///
    /// Re-checks after waking so an extension made while sleeping is honored.
    pub async fn wait(&self) {
        loop {
            let deadline = self.not_before();
            if Instant::now() >= deadline {
                return;
            }
            sleep_until(deadline).await;
        }
    }
}
