//! Process-wide cool-period gate.
//!
//! When the backend signals rate limiting, the client records the moment and
//! treats itself as "cooling" until a fixed threshold elapses. There is no
//! explicit clear — the period simply becomes inert once enough time has
//! passed, checked at each send attempt.
//!
//! The guard is advisory for the UI (disable the send affordance); the send
//! pipeline itself always attempts the call and relies on the backend's
//! status responses for correctness.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::constants::COOL_PERIOD_THRESHOLD;

/// Pure predicate: is a cool period started at `since` still active at `now`?
pub fn is_cooling(since: u64, now: u64, threshold: Duration) -> bool {
    now.saturating_sub(since) < threshold.as_millis() as u64
}

/// Shared cool-period state.
pub struct CoolPeriodGuard {
    since: Mutex<Option<u64>>,
    threshold: Duration,
}

impl CoolPeriodGuard {
    pub fn new(threshold: Duration) -> Self {
        Self {
            since: Mutex::new(None),
            threshold,
        }
    }

    /// Record a rate-limit signal observed at `now`. Repeated signals extend
    /// the period.
    pub fn mark(&self, now: u64) {
        debug!(now, "entering cool period");
        *self.since.lock() = Some(now);
    }

    /// When the most recent rate-limit signal was observed.
    pub fn since(&self) -> Option<u64> {
        *self.since.lock()
    }

    /// Whether the cool period is active at `now`.
    pub fn is_active(&self, now: u64) -> bool {
        self.since
            .lock()
            .map(|since| is_cooling(since, now, self.threshold))
            .unwrap_or(false)
    }

    /// UI affordance: may the send control be offered right now?
    pub fn send_allowed(&self, now: u64) -> bool {
        !self.is_active(now)
    }
}

impl Default for CoolPeriodGuard {
    fn default() -> Self {
        Self::new(COOL_PERIOD_THRESHOLD)
    }
}

// ============================================================================
// Tests
// ============================================================================
