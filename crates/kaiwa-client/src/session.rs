//! Thread session facade.
//!
//! [`ChatSession`] owns one thread's worth of client state — timeline,
//! pipeline, merger, typing, receipts, files — and exposes the operations a
//! UI drives: send, typing, receipts, history, roster, attachments. The
//! interesting logic lives in the components; this layer only wires them
//! over a [`ThreadChannel`] implementation and keeps the thin per-thread
//! bookkeeping (member cache, own-typing throttle).

use std::sync::Arc;

use kaiwa_files::{FileStore, FileStoreError};
use kaiwa_types::{
    ClientMessageId, FileId, FileMetadata, FileUploadNotice, MessageId, MessageType,
    ParsedContent, ReadReceipt, ThreadId, ThreadMember, now_millis,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::channel::{ChannelError, LocalIdentity, SendStatus, ThreadChannel, ThreadEvent};
use crate::constants::{INITIAL_MESSAGES_SIZE, MINIMUM_TYPING_INTERVAL};
use crate::cooldown::CoolPeriodGuard;
use crate::files::FileRegistry;
use crate::inbound::{InboundMerger, ReceiptBook};
use crate::outbound::{FailedSends, SendPipeline, SendPolicy};
use crate::timeline::{DeliveryState, MessageContent, Timeline, TimelineEntry};
use crate::typing::{TypingTracker, is_fresh};

/// Errors from session-level operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The roster no longer lists the local user.
    #[error("current user has been removed from the thread")]
    RemovedFromThread,
    /// The backend did not accept a file-upload notice message.
    #[error("file notice send was not accepted")]
    NoticeRejected,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    #[error("failed to encode file notice: {0}")]
    NoticeEncode(#[from] serde_json::Error),
}

/// One user's view of one thread.
pub struct ChatSession {
    identity: LocalIdentity,
    thread_id: ThreadId,
    channel: Arc<dyn ThreadChannel>,
    timeline: Arc<Timeline>,
    pipeline: Arc<SendPipeline>,
    merger: Arc<InboundMerger>,
    typing: Arc<TypingTracker>,
    receipts: Arc<ReceiptBook>,
    files: Arc<FileRegistry>,
    failed: Arc<FailedSends>,
    cool: Arc<CoolPeriodGuard>,
    members: Mutex<Vec<ThreadMember>>,
    last_typing_sent: Mutex<Option<u64>>,
}

impl ChatSession {
    pub fn new(
        channel: Arc<dyn ThreadChannel>,
        identity: LocalIdentity,
        thread_id: ThreadId,
        policy: SendPolicy,
    ) -> Self {
        let timeline = Arc::new(Timeline::new());
        let failed = Arc::new(FailedSends::new());
        let cool = Arc::new(CoolPeriodGuard::new(policy.cool_period_threshold));
        let typing = Arc::new(TypingTracker::default());
        let receipts = Arc::new(ReceiptBook::new());
        let files = Arc::new(FileRegistry::new());

        let pipeline = Arc::new(SendPipeline::new(
            channel.clone(),
            timeline.clone(),
            failed.clone(),
            cool.clone(),
            identity.clone(),
            policy,
        ));
        let merger = Arc::new(InboundMerger::new(
            channel.clone(),
            timeline.clone(),
            files.clone(),
            typing.clone(),
            receipts.clone(),
            identity.clone(),
        ));

        Self {
            identity,
            thread_id,
            channel,
            timeline,
            pipeline,
            merger,
            typing,
            receipts,
            files,
            failed,
            cool,
            members: Mutex::new(Vec::new()),
            last_typing_sent: Mutex::new(None),
        }
    }

    /// Subscribe the merger to the realtime push channel. The returned
    /// handle lets the owner stop or await the subscriber.
    pub fn attach_events(&self, events: broadcast::Receiver<ThreadEvent>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.merger).run(events))
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    /// Submit a message. It appears in the timeline as `Pending` before this
    /// returns; delivery and retries proceed in the background.
    pub fn send_message(&self, content: &str) -> ClientMessageId {
        self.pipeline.submit(content)
    }

    /// Announce the local user is typing, throttled to the same interval
    /// remote indicators stay fresh for. Returns whether a notification was
    /// actually sent.
    pub async fn send_typing(&self) -> Result<bool, ChannelError> {
        let now = now_millis();
        {
            let last = self.last_typing_sent.lock();
            if let Some(at) = *last
                && is_fresh(at, now, MINIMUM_TYPING_INTERVAL)
            {
                return Ok(false);
            }
        }
        self.channel.send_typing().await?;
        *self.last_typing_sent.lock() = Some(now);
        Ok(true)
    }

    /// Record that the local user has read up to `message_id`.
    pub async fn send_read_receipt(&self, message_id: &MessageId) -> Result<(), ChannelError> {
        self.channel.send_read_receipt(message_id).await
    }

    /// Wait for every in-flight send (including scheduled retries) to reach
    /// a terminal state.
    pub async fn wait_outbound_idle(&self) {
        self.pipeline.wait_idle().await;
    }

    // ── History & roster ─────────────────────────────────────────────────

    /// Seed the timeline from the thread's recent history. Non-text records
    /// (roster changes, topic updates) are skipped; file-upload notices are
    /// registered as attachments. Returns how many entries were folded in.
    pub async fn load_history(&self, limit: usize) -> Result<usize, SessionError> {
        let records = self
            .channel
            .list_messages(limit.min(INITIAL_MESSAGES_SIZE))
            .await?;

        let mut folded = 0;
        for record in records {
            if record.message_type != MessageType::Text {
                continue;
            }
            let created_at = record.created_at.unwrap_or_else(now_millis);
            let content = match ParsedContent::parse(&record.content) {
                ParsedContent::FileUpload(notice) => {
                    self.files.add_files([FileMetadata::new(
                        notice.file_id.clone(),
                        notice.file_name.clone(),
                        created_at,
                    )]);
                    MessageContent::FileReference {
                        file_id: notice.file_id,
                        file_name: notice.file_name,
                    }
                }
                ParsedContent::PlainText(text) => MessageContent::Text(text.to_string()),
            };
            self.timeline.upsert(TimelineEntry {
                client_id: ClientMessageId::new(),
                server_id: Some(record.id),
                sender: record.sender,
                sender_display_name: record.sender_display_name,
                content,
                created_at: Some(created_at),
                delivery: DeliveryState::Confirmed,
            });
            folded += 1;
        }
        Ok(folded)
    }

    /// Refresh the member cache from the roster. Members without display
    /// names are dropped; if the local user is gone, the thread is no longer
    /// usable and the caller gets the typed failure.
    pub async fn refresh_members(&self) -> Result<Vec<ThreadMember>, SessionError> {
        let roster = self.channel.list_members().await?;
        if !roster.iter().any(|m| m.user == self.identity.user_id) {
            return Err(SessionError::RemovedFromThread);
        }
        let members: Vec<ThreadMember> = roster
            .into_iter()
            .filter(|m| !m.display_name.is_empty())
            .collect();
        *self.members.lock() = members.clone();
        Ok(members)
    }

    /// The cached roster from the last successful refresh.
    pub fn members(&self) -> Vec<ThreadMember> {
        self.members.lock().clone()
    }

    // ── Attachments ──────────────────────────────────────────────────────

    /// Share a file: store the bytes, record per-thread metadata, then
    /// announce it with a file-upload notice message.
    pub async fn send_file(
        &self,
        store: &dyn FileStore,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<FileId, SessionError> {
        let file_id = store.upload(bytes).await?;
        store
            .put_metadata(
                &self.thread_id,
                FileMetadata::new(file_id.clone(), file_name, now_millis()),
            )
            .await?;

        let content = FileUploadNotice::new(file_id.clone(), file_name).encode()?;
        match self
            .channel
            .send_message(&content, &self.identity.display_name)
            .await?
        {
            SendStatus::Created { .. } => Ok(file_id),
            status => {
                warn!(?status, file_id = %file_id, "file notice not accepted");
                Err(SessionError::NoticeRejected)
            }
        }
    }

    /// Fetch an attachment's metadata and bytes, registering it locally.
    pub async fn fetch_file(
        &self,
        store: &dyn FileStore,
        file_id: &FileId,
    ) -> Result<(FileMetadata, Vec<u8>), SessionError> {
        let meta = store.get_metadata(&self.thread_id, file_id).await?;
        let bytes = store.download(file_id).await?;
        self.files.add_files([meta.clone()]);
        Ok((meta, bytes))
    }

    // ── Views ────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Vec<TimelineEntry> {
        self.timeline.snapshot()
    }

    pub fn failed_sends(&self) -> &Arc<FailedSends> {
        &self.failed
    }

    pub fn receipts(&self) -> Vec<ReadReceipt> {
        self.receipts.all()
    }

    pub fn files(&self) -> &Arc<FileRegistry> {
        &self.files
    }

    pub fn timeline(&self) -> &Arc<Timeline> {
        &self.timeline
    }

    /// Members typing right now, per the cached roster.
    pub fn typing_users(&self, now: u64) -> Vec<ThreadMember> {
        self.typing.currently_typing(&self.members(), now)
    }

    /// UI affordance: whether the send control should be offered. Sends
    /// submitted anyway are still attempted (see
    /// [`SendPipeline::submit`](crate::SendPipeline::submit)).
    pub fn send_allowed(&self, now: u64) -> bool {
        self.cool.send_allowed(now)
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use kaiwa_files::MemoryFileStore;
    use kaiwa_types::{MessageRecord, UserId};

    use super::*;

    /// Channel that records outgoing traffic and serves canned reads.
    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<String>>,
        typing_sent: Mutex<u32>,
        members: Mutex<Vec<ThreadMember>>,
        history: Mutex<Vec<MessageRecord>>,
        reject_sends: bool,
    }

    #[async_trait]
    impl ThreadChannel for RecordingChannel {
        async fn send_message(
            &self,
            content: &str,
            _sender_display_name: &str,
        ) -> Result<SendStatus, ChannelError> {
            self.sent.lock().push(content.to_string());
            if self.reject_sends {
                return Ok(SendStatus::Rejected { code: 500 });
            }
            Ok(SendStatus::Created {
                id: MessageId::new(format!("m{}", self.sent.lock().len())),
            })
        }

        async fn message_by_id(
            &self,
            _id: &MessageId,
        ) -> Result<Option<MessageRecord>, ChannelError> {
            Ok(None)
        }

        async fn list_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, ChannelError> {
            let history = self.history.lock();
            Ok(history.iter().take(limit).cloned().collect())
        }

        async fn list_members(&self) -> Result<Vec<ThreadMember>, ChannelError> {
            Ok(self.members.lock().clone())
        }

        async fn list_receipts(&self) -> Result<Vec<ReadReceipt>, ChannelError> {
            Ok(vec![])
        }

        async fn send_typing(&self) -> Result<(), ChannelError> {
            *self.typing_sent.lock() += 1;
            Ok(())
        }

        async fn send_read_receipt(&self, _message_id: &MessageId) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn session(channel: Arc<RecordingChannel>) -> ChatSession {
        ChatSession::new(
            channel,
            LocalIdentity::new(UserId::new("u-self"), "Self"),
            ThreadId::new("t1"),
            SendPolicy::default(),
        )
    }

    fn text_record(id: &str, sender: &str, content: &str, ts: u64) -> MessageRecord {
        MessageRecord {
            id: MessageId::new(id),
            message_type: MessageType::Text,
            sender: UserId::new(sender),
            sender_display_name: sender.to_uppercase(),
            content: content.to_string(),
            created_at: Some(ts),
        }
    }

    #[tokio::test]
    async fn test_typing_is_throttled() {
        let channel = Arc::new(RecordingChannel::default());
        let session = session(channel.clone());

        assert!(session.send_typing().await.unwrap());
        assert!(!session.send_typing().await.unwrap());
        assert_eq!(*channel.typing_sent.lock(), 1);
    }

    #[tokio::test]
    async fn test_refresh_members_filters_unnamed_and_caches() {
        let channel = Arc::new(RecordingChannel::default());
        *channel.members.lock() = vec![
            ThreadMember::new(UserId::new("u-self"), "Self"),
            ThreadMember::new(UserId::new("u-ghost"), ""),
            ThreadMember::new(UserId::new("u-bob"), "Bob"),
        ];
        let session = session(channel);

        let members = session.refresh_members().await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(session.members(), members);
    }

    #[tokio::test]
    async fn test_refresh_members_detects_removal() {
        let channel = Arc::new(RecordingChannel::default());
        *channel.members.lock() = vec![ThreadMember::new(UserId::new("u-bob"), "Bob")];
        let session = session(channel);

        assert!(matches!(
            session.refresh_members().await,
            Err(SessionError::RemovedFromThread)
        ));
        assert!(session.members().is_empty(), "cache untouched on failure");
    }

    #[tokio::test]
    async fn test_load_history_seeds_timeline_and_files() {
        let channel = Arc::new(RecordingChannel::default());
        *channel.history.lock() = vec![
            text_record("m1", "u-bob", "hello", 100),
            MessageRecord {
                message_type: MessageType::MemberAdded,
                ..text_record("m2", "u-bob", "", 150)
            },
            text_record(
                "m3",
                "u-bob",
                r#"{"event":"FileUpload","fileId":"f1","fileName":"a.png"}"#,
                200,
            ),
        ];
        let session = session(channel);

        let folded = session.load_history(50).await.unwrap();
        assert_eq!(folded, 2);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].content.as_text(), Some("hello"));
        assert!(matches!(
            snapshot[1].content,
            MessageContent::FileReference { .. }
        ));
        assert!(session.files().contains(&FileId::new("f1")));
    }

    #[tokio::test]
    async fn test_load_history_is_idempotent() {
        let channel = Arc::new(RecordingChannel::default());
        *channel.history.lock() = vec![text_record("m1", "u-bob", "hello", 100)];
        let session = session(channel);

        session.load_history(50).await.unwrap();
        session.load_history(50).await.unwrap();
        assert_eq!(session.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_send_file_stores_then_announces() {
        let channel = Arc::new(RecordingChannel::default());
        let session = session(channel.clone());
        let store = MemoryFileStore::new();

        let file_id = session
            .send_file(&store, "a.png", b"bytes".to_vec())
            .await
            .unwrap();

        // Bytes and metadata landed in the store.
        assert_eq!(store.download(&file_id).await.unwrap(), b"bytes");
        let metas = store.list_metadata(&ThreadId::new("t1")).await.unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name, "a.png");

        // The announcement is a well-formed notice for that file.
        let sent = channel.sent.lock();
        assert_eq!(sent.len(), 1);
        match ParsedContent::parse(&sent[0]) {
            ParsedContent::FileUpload(notice) => {
                assert_eq!(notice.file_id, file_id);
                assert_eq!(notice.file_name, "a.png");
            }
            other => panic!("expected file notice, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_file_surfaces_rejected_notice() {
        let channel = Arc::new(RecordingChannel {
            reject_sends: true,
            ..Default::default()
        });
        let session = session(channel);
        let store = MemoryFileStore::new();

        assert!(matches!(
            session.send_file(&store, "a.png", vec![1]).await,
            Err(SessionError::NoticeRejected)
        ));
    }

    #[tokio::test]
    async fn test_fetch_file_registers_locally() {
        let channel = Arc::new(RecordingChannel::default());
        let session = session(channel);
        let store = MemoryFileStore::new();

        let file_id = store.upload(b"payload".to_vec()).await.unwrap();
        store
            .put_metadata(
                &ThreadId::new("t1"),
                FileMetadata::new(file_id.clone(), "a.png", 10),
            )
            .await
            .unwrap();

        let (meta, bytes) = session.fetch_file(&store, &file_id).await.unwrap();
        assert_eq!(meta.name, "a.png");
        assert_eq!(bytes, b"payload");
        assert!(session.files().contains(&file_id));
    }

    #[tokio::test]
    async fn test_fetch_file_missing_is_typed() {
        let channel = Arc::new(RecordingChannel::default());
        let session = session(channel);
        let store = MemoryFileStore::new();

        assert!(matches!(
            session.fetch_file(&store, &FileId::new("nope")).await,
            Err(SessionError::FileStore(FileStoreError::NotFound(_)))
        ));
    }
}
