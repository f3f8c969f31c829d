//! Outbound send pipeline.
//!
//! Each submitted message gets a provisional timeline entry immediately (the
//! UI shows it before the network confirms), then a delivery task that walks
//! the retry state machine:
//!
//! ```text
//!                    ┌─────────── rate limited ──────────┐
//!                    │   (cool period; retry unbounded)  │
//!                    ▼                                   │
//! submit ──► Pending ──► send ──► created ──► fetch ──► Confirmed
//!                    │                                (falls back to the
//!                    │                                 local clock if the
//!                    ├── conflict ◄─ retry ≤ max ──┐    fetch misbehaves)
//!                    │       │                     │
//!                    │       └── attempts spent ──► Failed (+ failed set)
//!                    └── other status / transport ─► Failed (+ failed set)
//! ```
//!
//! Rate-limit responses mark the process-wide cool period and schedule one
//! retry after the cool-period threshold without touching the attempt
//! counter; only precondition conflicts consume attempts. Delivery tasks are
//! spawned on a [`TaskTracker`] so owners (and tests) can wait for every
//! scheduled retry instead of leaking timers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kaiwa_types::{ClientMessageId, MessageId, MessageRecord, now_millis};
use parking_lot::Mutex;
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::channel::{LocalIdentity, SendStatus, ThreadChannel};
use crate::constants::{CONFLICT_RETRY_DELAY, COOL_PERIOD_THRESHOLD, MAXIMUM_RETRY_COUNT};
use crate::cooldown::CoolPeriodGuard;
use crate::timeline::{DeliveryState, MessageContent, Timeline, TimelineEntry};

// ============================================================================
// Policy
// ============================================================================

/// Retry policy knobs. Defaults are the production constants; tests shrink
/// the delays.
#[derive(Clone, Debug)]
pub struct SendPolicy {
    /// Delivery attempts consumed by precondition conflicts before giving up.
    pub max_attempts: u32,
    /// Delay before retrying a conflicted send.
    pub conflict_retry_delay: Duration,
    /// Delay before the single rate-limit retry; also how long the cool
    /// period stays active.
    pub cool_period_threshold: Duration,
}

impl Default for SendPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAXIMUM_RETRY_COUNT,
            conflict_retry_delay: CONFLICT_RETRY_DELAY,
            cool_period_threshold: COOL_PERIOD_THRESHOLD,
        }
    }
}

// ============================================================================
// Failed-sends set
// ============================================================================

/// Correlation ids of sends that exhausted the state machine. The UI layer
/// decides presentation.
#[derive(Default)]
pub struct FailedSends {
    inner: Mutex<HashSet<ClientMessageId>>,
}

impl FailedSends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, client_id: ClientMessageId) {
        self.inner.lock().insert(client_id);
    }

    pub fn contains(&self, client_id: &ClientMessageId) -> bool {
        self.inner.lock().contains(client_id)
    }

    pub fn all(&self) -> HashSet<ClientMessageId> {
        self.inner.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Transient retry state for one outbound message. Dropped on terminal
/// success or failure.
struct PendingSend {
    client_id: ClientMessageId,
    content: String,
    attempt: u32,
}

/// The outbound half of the client: provisional entries in, delivery tasks
/// out. Shares the [`Timeline`] and [`FailedSends`] with the inbound merger.
pub struct SendPipeline {
    channel: Arc<dyn ThreadChannel>,
    timeline: Arc<Timeline>,
    failed: Arc<FailedSends>,
    cool: Arc<CoolPeriodGuard>,
    identity: LocalIdentity,
    policy: SendPolicy,
    tasks: TaskTracker,
}

impl SendPipeline {
    pub fn new(
        channel: Arc<dyn ThreadChannel>,
        timeline: Arc<Timeline>,
        failed: Arc<FailedSends>,
        cool: Arc<CoolPeriodGuard>,
        identity: LocalIdentity,
        policy: SendPolicy,
    ) -> Self {
        Self {
            channel,
            timeline,
            failed,
            cool,
            identity,
            policy,
            tasks: TaskTracker::new(),
        }
    }

    /// Submit a message: the provisional entry is visible in the timeline
    /// before this returns, and delivery proceeds in a tracked background
    /// task. Submits during an active cool period are attempted anyway — the
    /// guard is a UI affordance, the backend's responses are the truth.
    pub fn submit(self: &Arc<Self>, content: &str) -> ClientMessageId {
        let client_id = ClientMessageId::new();
        self.timeline.upsert(TimelineEntry::pending(
            client_id,
            self.identity.user_id.clone(),
            self.identity.display_name.clone(),
            MessageContent::Text(content.to_string()),
        ));

        let send = PendingSend {
            client_id,
            content: content.to_string(),
            attempt: 0,
        };
        let pipeline = Arc::clone(self);
        self.tasks.spawn(async move { pipeline.deliver(send).await });
        client_id
    }

    /// Wait until every spawned delivery task (including scheduled retries)
    /// has reached a terminal state.
    pub async fn wait_idle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    async fn deliver(&self, mut send: PendingSend) {
        loop {
            let outcome = self
                .channel
                .send_message(&send.content, &self.identity.display_name)
                .await;

            match outcome {
                Ok(SendStatus::Created { id }) => {
                    debug!(client_id = %send.client_id, server_id = %id, "send accepted");
                    self.confirm(&send, id).await;
                    return;
                }
                Ok(SendStatus::RateLimited) => {
                    // Attempt counter intentionally untouched: rate-limit
                    // retries are not bounded by max_attempts.
                    self.cool.mark(now_millis());
                    debug!(client_id = %send.client_id, "rate limited; retrying after cool period");
                    sleep(self.policy.cool_period_threshold).await;
                }
                Ok(SendStatus::PreconditionFailed) => {
                    send.attempt += 1;
                    if send.attempt >= self.policy.max_attempts {
                        warn!(
                            client_id = %send.client_id,
                            attempts = send.attempt,
                            "giving up after repeated conflicts"
                        );
                        self.fail(send.client_id);
                        return;
                    }
                    debug!(
                        client_id = %send.client_id,
                        attempt = send.attempt,
                        "conflict; retrying shortly"
                    );
                    sleep(self.policy.conflict_retry_delay).await;
                }
                Ok(SendStatus::Rejected { code }) => {
                    warn!(client_id = %send.client_id, code, "send rejected");
                    self.fail(send.client_id);
                    return;
                }
                Err(e) => {
                    warn!(client_id = %send.client_id, error = %e, "send transport failure");
                    self.fail(send.client_id);
                    return;
                }
            }
        }
    }

    /// Reconcile an accepted send with the server's canonical record. A
    /// misbehaving fetch (error, missing record, missing timestamp) falls
    /// back to confirming with the local clock — delivery confirmation never
    /// blocks on the secondary read.
    async fn confirm(&self, send: &PendingSend, server_id: MessageId) {
        let canonical = match self.channel.message_by_id(&server_id).await {
            Ok(record) => record,
            Err(e) => {
                debug!(server_id = %server_id, error = %e, "canonical fetch failed");
                None
            }
        };

        let entry = match canonical {
            Some(MessageRecord {
                id,
                sender_display_name,
                content,
                created_at: Some(ts),
                ..
            }) => TimelineEntry::confirmed(
                send.client_id,
                id,
                self.identity.user_id.clone(),
                sender_display_name,
                MessageContent::Text(content),
                ts,
            ),
            _ => TimelineEntry::confirmed(
                send.client_id,
                server_id,
                self.identity.user_id.clone(),
                self.identity.display_name.clone(),
                MessageContent::Text(send.content.clone()),
                now_millis(),
            ),
        };
        self.timeline.upsert(entry);
    }

    fn fail(&self, client_id: ClientMessageId) {
        self.failed.record(client_id);
        if let Some(mut entry) = self.timeline.get(&client_id) {
            entry.delivery = DeliveryState::Failed;
            self.timeline.upsert(entry);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
