//! Wire-level message, membership, and receipt records.
//!
//! These are the shapes the thread API hands back — canonical server state,
//! as opposed to the client's reconciled timeline entries which live in
//! `kaiwa-client`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::ids::{MessageId, UserId};

/// What kind of message the server stored.
///
/// Only `Text` messages participate in the visible timeline; the rest are
/// thread housekeeping the backend interleaves into the message list.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum MessageType {
    #[default]
    Text,
    TopicUpdated,
    MemberAdded,
    MemberRemoved,
    Other,
}

/// Canonical message record as returned by the thread API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: MessageId,
    pub message_type: MessageType,
    pub sender: UserId,
    pub sender_display_name: String,
    /// Raw content string. May be a plain message or an embedded
    /// file-upload notice — see [`crate::notice::ParsedContent`].
    pub content: String,
    /// Server-assigned creation time (unix millis). The backend can return
    /// records before the timestamp is durable, so this stays optional.
    pub created_at: Option<u64>,
}

/// Thread roster entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMember {
    pub user: UserId,
    pub display_name: String,
}

impl ThreadMember {
    pub fn new(user: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user,
            display_name: display_name.into(),
        }
    }
}

/// A read receipt: `sender` has read up to `message_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub sender: UserId,
    pub message_id: MessageId,
    /// When the backend observed the read (unix millis).
    pub read_at: u64,
}

// ============================================================================
// Tests
// ============================================================================
