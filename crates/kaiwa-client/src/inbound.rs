//! Inbound realtime-event merger.
//!
//! The single logical subscriber for the thread's push channel. Message
//! events fold into the shared [`Timeline`] (deduplicating against entries
//! the outbound pipeline already created), typing events feed the
//! [`TypingTracker`], and read-receipt events trigger a wholesale receipt
//! re-fetch — the channel does not push incremental receipt diffs.
//!
//! # Message handling
//!
//! - File-upload notices are server-synthesized and never locally echoed, so
//!   they register metadata in the [`FileRegistry`] and upsert a
//!   `FileReference` entry regardless of sender.
//! - Plain text from the local user is an echo of our own send. If the
//!   timeline already holds that server id, it is discarded; if not (the
//!   echo outran our confirmation fetch, or came from another tab), it is
//!   merged as a Confirmed entry — the store's server-id collapse keeps the
//!   timeline duplicate-free when our own confirmation lands afterwards.
//! - Plain text from anyone else upserts as a Confirmed entry.

use std::sync::Arc;

use kaiwa_types::{ClientMessageId, FileMetadata, ParsedContent, ReadReceipt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{trace, warn};

use crate::channel::{InboundMessage, LocalIdentity, ThreadChannel, ThreadEvent};
use crate::files::FileRegistry;
use crate::timeline::{MessageContent, Timeline, TimelineEntry};
use crate::typing::TypingTracker;

// ============================================================================
// Receipt book
// ============================================================================

/// The thread's read receipts, replaced wholesale on every receipt event.
#[derive(Default)]
pub struct ReceiptBook {
    receipts: Mutex<Vec<ReadReceipt>>,
}

impl ReceiptBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all(&self, receipts: Vec<ReadReceipt>) {
        *self.receipts.lock() = receipts;
    }

    pub fn all(&self) -> Vec<ReadReceipt> {
        self.receipts.lock().clone()
    }
}

// ============================================================================
// Merger
// ============================================================================

/// Folds pushed events into the client's shared state.
pub struct InboundMerger {
    channel: Arc<dyn ThreadChannel>,
    timeline: Arc<Timeline>,
    files: Arc<FileRegistry>,
    typing: Arc<TypingTracker>,
    receipts: Arc<ReceiptBook>,
    identity: LocalIdentity,
}

impl InboundMerger {
    pub fn new(
        channel: Arc<dyn ThreadChannel>,
        timeline: Arc<Timeline>,
        files: Arc<FileRegistry>,
        typing: Arc<TypingTracker>,
        receipts: Arc<ReceiptBook>,
        identity: LocalIdentity,
    ) -> Self {
        Self {
            channel,
            timeline,
            files,
            typing,
            receipts,
            identity,
        }
    }

    /// Consume pushed events until the channel closes. Lagged receivers skip
    /// ahead rather than exit — a receipt refresh or the next message event
    /// restores consistency.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ThreadEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.apply(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged; continuing");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        trace!("event channel closed; merger stopping");
    }

    /// Fold one event. Split out from [`run`](Self::run) so tests can drive
    /// the merger without a broadcast channel.
    pub async fn apply(&self, event: ThreadEvent) {
        match event {
            ThreadEvent::Message(message) => self.apply_message(message),
            ThreadEvent::Typing { sender, received_at } => {
                self.typing.record(sender, received_at);
            }
            ThreadEvent::ReadReceipt { .. } => self.refresh_receipts().await,
        }
    }

    fn apply_message(&self, message: InboundMessage) {
        match ParsedContent::parse(&message.content) {
            ParsedContent::FileUpload(notice) => {
                self.files.add_files([FileMetadata::new(
                    notice.file_id.clone(),
                    notice.file_name.clone(),
                    message.created_at,
                )]);
                self.timeline.upsert(TimelineEntry::confirmed(
                    ClientMessageId::new(),
                    message.id,
                    message.sender,
                    message.sender_display_name,
                    MessageContent::FileReference {
                        file_id: notice.file_id,
                        file_name: notice.file_name,
                    },
                    message.created_at,
                ));
            }
            ParsedContent::PlainText(text) => {
                if message.sender == self.identity.user_id
                    && self.timeline.find_by_server_id(&message.id).is_some()
                {
                    trace!(server_id = %message.id, "own echo already represented; discarding");
                    return;
                }
                // Other senders, plus own echoes that beat our confirmation
                // fetch (or came from another session).
                let content = MessageContent::Text(text.to_string());
                self.timeline.upsert(TimelineEntry::confirmed(
                    ClientMessageId::new(),
                    message.id,
                    message.sender,
                    message.sender_display_name,
                    content,
                    message.created_at,
                ));
            }
        }
    }

    /// Replace the receipt set from the channel's full list. Failures are
    /// logged and the stale set stands — the next receipt event retries.
    async fn refresh_receipts(&self) {
        match self.channel.list_receipts().await {
            Ok(receipts) => self.receipts.replace_all(receipts),
            Err(e) => warn!(error = %e, "receipt refresh failed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
