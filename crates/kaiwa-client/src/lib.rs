//! Kaiwa chat client core.
//!
//! Implements the client half of an at-least-once chat delivery protocol:
//! locally-composed messages, server confirmations, and remotely-received
//! events are folded into one ordered, deduplicated timeline that survives
//! retries, rate limiting, and out-of-order delivery.
//!
//! ```text
//!   UI submit                        realtime push
//!       │                                 │
//!       ▼                                 ▼
//!   SendPipeline ──┐               InboundMerger ──┐
//!   (retry state   │   upsert           (echo      │  upsert
//!    machine)      ├──────────► Timeline  dedup)   ├─────────►
//!                  │          (ordered store)      │
//!   CoolPeriodGuard┘                TypingTracker, ReceiptBook,
//!                                   FileRegistry
//! ```
//!
//! The [`Timeline`]'s `upsert` is commutative and idempotent across both
//! writers — that is the central correctness property; everything else
//! (backoff policy, typing freshness, receipt refresh) hangs off it.
//! [`ChatSession`] wires the pieces together over a [`ThreadChannel`]
//! implementation.

pub mod channel;
pub mod constants;
pub mod cooldown;
pub mod files;
pub mod inbound;
pub mod outbound;
pub mod session;
pub mod timeline;
pub mod typing;

pub use channel::{
    ChannelError, InboundMessage, LocalIdentity, SendStatus, ThreadChannel, ThreadEvent,
};
pub use cooldown::{CoolPeriodGuard, is_cooling};
pub use files::{FileRegistry, RegisteredFile};
pub use inbound::{InboundMerger, ReceiptBook};
pub use outbound::{FailedSends, SendPipeline, SendPolicy};
pub use session::{ChatSession, SessionError};
pub use timeline::{
    DeliveryState, MessageContent, Timeline, TimelineEntry, TimelineError, ordering_key,
};
pub use typing::{TypingTracker, is_fresh};
