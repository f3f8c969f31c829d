//! Client configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Maximum delivery attempts for a send that keeps hitting precondition
/// conflicts. Rate-limit retries are not counted against this.
pub const MAXIMUM_RETRY_COUNT: u32 = 3;

/// How long the backend's rate-limit signal keeps the client cool. Also the
/// delay before the single rate-limit retry.
pub const COOL_PERIOD_THRESHOLD: Duration = Duration::from_secs(60);

/// Delay before retrying a send rejected with a precondition conflict.
pub const CONFLICT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Freshness window for remote typing indicators, and the minimum interval
/// between our own outgoing typing notifications.
pub const MINIMUM_TYPING_INTERVAL: Duration = Duration::from_millis(8000);

/// Page size when listing messages from the thread API.
pub const PAGE_SIZE: usize = 200;

/// Cap on messages pulled when seeding timeline history.
pub const INITIAL_MESSAGES_SIZE: usize = 2000;
