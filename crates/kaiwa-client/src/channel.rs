//! Collaborator seam for the external chat backend.
//!
//! [`ThreadChannel`] abstracts the REST-like thread API surface the client
//! consumes (send, fetch-by-id, rosters, receipts), and [`ThreadEvent`] is
//! the typed form of what the realtime notification channel pushes. The
//! concrete backend — its wire protocol, auth, pagination — lives behind
//! these types and is out of scope here.

use async_trait::async_trait;
use kaiwa_types::{MessageId, MessageRecord, ReadReceipt, ThreadMember, UserId};
use thiserror::Error;

/// Errors from the thread API.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Network or timeout failure. Terminal for the attempt that hit it.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The backend throttled a read-side call.
    #[error("rate limited by the backend")]
    RateLimited,
    /// The backend has no such resource.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Outcome of a send attempt, per the backend's status contract:
/// 201-equivalent = created, 429 = rate limited, 412 = precondition failed,
/// anything else = rejected. Transport failures are `Err(ChannelError)`
/// instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendStatus {
    /// The backend accepted the message and assigned it a durable id.
    Created { id: MessageId },
    /// Too many requests; the client must cool down before retrying.
    RateLimited,
    /// Precondition failed; retry may succeed.
    PreconditionFailed,
    /// Any other non-success status.
    Rejected { code: u16 },
}

/// The thread API surface the client core consumes.
#[async_trait]
pub trait ThreadChannel: Send + Sync {
    /// Submit a message to the thread.
    async fn send_message(
        &self,
        content: &str,
        sender_display_name: &str,
    ) -> Result<SendStatus, ChannelError>;

    /// Fetch the canonical record for an accepted message.
    async fn message_by_id(&self, id: &MessageId) -> Result<Option<MessageRecord>, ChannelError>;

    /// Most recent messages, newest first, up to `limit`.
    async fn list_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, ChannelError>;

    /// Current thread roster.
    async fn list_members(&self) -> Result<Vec<ThreadMember>, ChannelError>;

    /// Full read-receipt list. The realtime channel does not push receipt
    /// diffs, so consumers re-fetch and replace wholesale.
    async fn list_receipts(&self) -> Result<Vec<ReadReceipt>, ChannelError>;

    /// Announce that the local user is typing.
    async fn send_typing(&self) -> Result<(), ChannelError>;

    /// Record that the local user has read up to `message_id`.
    async fn send_read_receipt(&self, message_id: &MessageId) -> Result<(), ChannelError>;
}

// ============================================================================
// Push events
// ============================================================================

/// Events pushed from the realtime notification channel.
///
/// These are the typed, deserialized forms of backend push callbacks. The
/// [`InboundMerger`](crate::InboundMerger) is the single logical subscriber.
#[derive(Clone, Debug)]
pub enum ThreadEvent {
    /// A message landed in the thread (including echoes of our own sends).
    Message(InboundMessage),
    /// Someone is typing.
    Typing { sender: UserId, received_at: u64 },
    /// Someone's read position moved.
    ReadReceipt {
        sender: UserId,
        message_id: MessageId,
    },
}

/// A pushed message event.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub id: MessageId,
    pub sender: UserId,
    pub sender_display_name: String,
    /// Raw content; may embed a file-upload notice.
    pub content: String,
    /// Server creation time (unix millis).
    pub created_at: u64,
}

/// Who the local user is, for echo suppression and outgoing sends.
#[derive(Clone, Debug)]
pub struct LocalIdentity {
    pub user_id: UserId,
    pub display_name: String,
}

impl LocalIdentity {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
        }
    }
}
