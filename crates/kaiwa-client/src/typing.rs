//! Remote typing indicators.
//!
//! Typing events are cheap and frequent; the tracker just remembers when
//! each sender was last seen typing. A periodic evaluator (UI-driven) calls
//! [`TypingTracker::currently_typing`] to compute the display set: senders
//! seen within the freshness window who are also current thread members.

use std::collections::HashMap;
use std::time::Duration;

use kaiwa_types::{ThreadMember, UserId};
use parking_lot::Mutex;

use crate::constants::MINIMUM_TYPING_INTERVAL;

/// Pure predicate: does a typing notice last seen at `last_seen` still count
/// at `now`? The window is inclusive — a notice exactly `window` old still
/// displays.
pub fn is_fresh(last_seen: u64, now: u64, window: Duration) -> bool {
    now.saturating_sub(last_seen) <= window.as_millis() as u64
}

/// Last-seen typing times per sender.
pub struct TypingTracker {
    notices: Mutex<HashMap<UserId, u64>>,
    freshness: Duration,
}

impl TypingTracker {
    pub fn new(freshness: Duration) -> Self {
        Self {
            notices: Mutex::new(HashMap::new()),
            freshness,
        }
    }

    /// Record a typing notice from `sender` observed at `at`.
    pub fn record(&self, sender: UserId, at: u64) {
        self.notices.lock().insert(sender, at);
    }

    /// The members currently typing: last seen within the freshness window
    /// AND present in the roster. Stale senders and departed members drop
    /// out without any explicit cleanup.
    pub fn currently_typing(&self, members: &[ThreadMember], now: u64) -> Vec<ThreadMember> {
        let notices = self.notices.lock();
        members
            .iter()
            .filter(|member| {
                notices
                    .get(&member.user)
                    .is_some_and(|&last_seen| is_fresh(last_seen, now, self.freshness))
            })
            .cloned()
            .collect()
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new(MINIMUM_TYPING_INTERVAL)
    }
}

// ============================================================================
// Tests
// ============================================================================
