//! End-to-end reconciliation scenarios over a scripted channel.
//!
//! These drive a full [`ChatSession`] — outbound pipeline, inbound merger,
//! shared timeline — against a mock backend with controllable send
//! responses, canonical records, and fetch timing, to pin down the
//! interleaving-sensitive properties that unit tests can't reach.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast};
use tokio::task::yield_now;

use kaiwa_client::{
    ChannelError, ChatSession, DeliveryState, InboundMessage, LocalIdentity, MessageContent,
    SendPolicy, SendStatus, ThreadChannel, ThreadEvent,
};
use kaiwa_files::{FileStore, MemoryFileStore};
use kaiwa_identity::{CredentialProvider, MemoryCredentialProvider};
use kaiwa_types::{
    FileId, MessageId, MessageRecord, MessageType, ReadReceipt, ThreadId, ThreadMember, UserId,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Scripted per-content send behavior.
#[derive(Clone, Copy, Debug)]
enum Script {
    RateLimited,
    PreconditionFailed,
}

/// Mock backend: scripted send responses keyed by content, auto-minted
/// message ids, canonical records, and a gate to stall confirmation fetches.
#[derive(Default)]
struct MockChannel {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    records: Mutex<HashMap<MessageId, MessageRecord>>,
    /// Timestamp stamped onto auto-registered records.
    record_ts: Mutex<Option<u64>>,
    next_id: Mutex<u32>,
    hold_fetch: AtomicBool,
    fetch_release: Notify,
    receipts: Mutex<Vec<ReadReceipt>>,
}

impl MockChannel {
    fn new(record_ts: u64) -> Self {
        Self {
            record_ts: Mutex::new(Some(record_ts)),
            ..Default::default()
        }
    }

    fn script(&self, content: &str, responses: Vec<Script>) {
        self.scripts
            .lock()
            .insert(content.to_string(), responses.into());
    }

    fn last_minted_id(&self) -> MessageId {
        MessageId::new(format!("m{}", self.next_id.lock()))
    }
}

#[async_trait]
impl ThreadChannel for MockChannel {
    async fn send_message(
        &self,
        content: &str,
        sender_display_name: &str,
    ) -> Result<SendStatus, ChannelError> {
        if let Some(script) = self
            .scripts
            .lock()
            .get_mut(content)
            .and_then(|queue| queue.pop_front())
        {
            return Ok(match script {
                Script::RateLimited => SendStatus::RateLimited,
                Script::PreconditionFailed => SendStatus::PreconditionFailed,
            });
        }

        let id = {
            let mut next = self.next_id.lock();
            *next += 1;
            MessageId::new(format!("m{next}"))
        };
        if let Some(ts) = *self.record_ts.lock() {
            self.records.lock().insert(
                id.clone(),
                MessageRecord {
                    id: id.clone(),
                    message_type: MessageType::Text,
                    sender: UserId::new("u-self"),
                    sender_display_name: sender_display_name.to_string(),
                    content: content.to_string(),
                    created_at: Some(ts),
                },
            );
        }
        Ok(SendStatus::Created { id })
    }

    async fn message_by_id(&self, id: &MessageId) -> Result<Option<MessageRecord>, ChannelError> {
        if self.hold_fetch.load(Ordering::SeqCst) {
            self.fetch_release.notified().await;
        }
        Ok(self.records.lock().get(id).cloned())
    }

    async fn list_messages(&self, _limit: usize) -> Result<Vec<MessageRecord>, ChannelError> {
        Ok(vec![])
    }

    async fn list_members(&self) -> Result<Vec<ThreadMember>, ChannelError> {
        Ok(vec![
            ThreadMember::new(UserId::new("u-self"), "Self"),
            ThreadMember::new(UserId::new("u-bob"), "Bob"),
        ])
    }

    async fn list_receipts(&self) -> Result<Vec<ReadReceipt>, ChannelError> {
        Ok(self.receipts.lock().clone())
    }

    async fn send_typing(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_read_receipt(&self, message_id: &MessageId) -> Result<(), ChannelError> {
        self.receipts.lock().push(ReadReceipt {
            sender: UserId::new("u-self"),
            message_id: message_id.clone(),
            read_at: 0,
        });
        Ok(())
    }
}

fn session_over(channel: Arc<MockChannel>) -> ChatSession {
    ChatSession::new(
        channel,
        LocalIdentity::new(UserId::new("u-self"), "Self"),
        ThreadId::new("t1"),
        SendPolicy::default(),
    )
}

/// Poll until `check` passes, yielding to let background tasks progress.
async fn settle(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        yield_now().await;
    }
    panic!("condition did not settle");
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn submitted_text_confirms_against_canonical_record() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(1234));
    let session = session_over(channel.clone());

    let client_id = session.send_message("hi");

    // Provisional entry first: one Pending, no timestamp.
    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].delivery, DeliveryState::Pending);
    assert_eq!(snapshot[0].created_at, None);

    session.wait_outbound_idle().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].client_id, client_id);
    assert_eq!(snapshot[0].server_id, Some(MessageId::new("m1")));
    assert_eq!(snapshot[0].created_at, Some(1234));
    assert_eq!(snapshot[0].delivery, DeliveryState::Confirmed);
    assert!(session.failed_sends().is_empty());
}

#[tokio::test(start_paused = true)]
async fn echo_arriving_before_confirmation_leaves_one_entry() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(1234));
    channel.hold_fetch.store(true, Ordering::SeqCst);
    let session = session_over(channel.clone());

    let (events_tx, events_rx) = broadcast::channel(16);
    let merger_task = session.attach_events(events_rx);

    let client_id = session.send_message("hi");

    // Let the send complete; the confirmation fetch is now parked.
    settle(|| *channel.next_id.lock() == 1).await;
    let server_id = channel.last_minted_id();

    // The realtime echo of our own message outruns the fetch.
    events_tx
        .send(ThreadEvent::Message(InboundMessage {
            id: server_id.clone(),
            sender: UserId::new("u-self"),
            sender_display_name: "Self".to_string(),
            content: "hi".to_string(),
            created_at: 1234,
        }))
        .expect("push echo");
    settle(|| session.timeline().find_by_server_id(&server_id).is_some()).await;

    // Release the fetch and drain the pipeline.
    channel.hold_fetch.store(false, Ordering::SeqCst);
    channel.fetch_release.notify_waiters();
    session.wait_outbound_idle().await;

    // Exactly one visible entry, carrying the original correlation id.
    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].client_id, client_id);
    assert_eq!(snapshot[0].server_id, Some(server_id));
    assert_eq!(snapshot[0].delivery, DeliveryState::Confirmed);

    drop(events_tx);
    merger_task.await.expect("merger");
}

#[tokio::test(start_paused = true)]
async fn rate_limited_burst_preserves_submission_order() {
    init_tracing();
    // All three confirm with the same server timestamp.
    let channel = Arc::new(MockChannel::new(5000));
    for content in ["one", "two", "three"] {
        channel.script(content, vec![Script::RateLimited]);
    }
    let session = session_over(channel.clone());

    session.send_message("one");
    session.send_message("two");
    session.send_message("three");
    session.wait_outbound_idle().await;

    let snapshot = session.snapshot();
    let texts: Vec<&str> = snapshot
        .iter()
        .map(|e| e.content.as_text().expect("text"))
        .collect();
    assert_eq!(texts, ["one", "two", "three"]);
    assert!(snapshot.iter().all(|e| e.delivery == DeliveryState::Confirmed));
    assert!(snapshot.iter().all(|e| e.created_at == Some(5000)));
}

#[tokio::test(start_paused = true)]
async fn conflicted_send_lands_in_failed_set_but_later_sends_survive() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(5000));
    channel.script(
        "doomed",
        vec![
            Script::PreconditionFailed,
            Script::PreconditionFailed,
            Script::PreconditionFailed,
        ],
    );
    let session = session_over(channel.clone());

    let doomed = session.send_message("doomed");
    let fine = session.send_message("fine");
    session.wait_outbound_idle().await;

    assert!(session.failed_sends().contains(&doomed));
    assert!(!session.failed_sends().contains(&fine));

    let snapshot = session.snapshot();
    let by_id: HashMap<_, _> = snapshot.iter().map(|e| (e.client_id, e.delivery)).collect();
    assert_eq!(by_id[&doomed], DeliveryState::Failed);
    assert_eq!(by_id[&fine], DeliveryState::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn shared_file_round_trips_through_store_and_echo() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(9000));
    let session = session_over(channel.clone());
    let store = MemoryFileStore::new();

    let (events_tx, events_rx) = broadcast::channel(16);
    let merger_task = session.attach_events(events_rx);

    let file_id = session
        .send_file(&store, "a.png", b"bytes".to_vec())
        .await
        .expect("send file");

    // The backend synthesizes the notice echo back to every member,
    // including the sender.
    let notice_content = channel
        .records
        .lock()
        .get(&channel.last_minted_id())
        .expect("notice record")
        .content
        .clone();
    events_tx
        .send(ThreadEvent::Message(InboundMessage {
            id: channel.last_minted_id(),
            sender: UserId::new("u-self"),
            sender_display_name: "Self".to_string(),
            content: notice_content,
            created_at: 9000,
        }))
        .expect("push notice");
    settle(|| !session.files().is_empty()).await;

    // One FileReference entry, and the registry knows the file.
    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(
        snapshot[0].content,
        MessageContent::FileReference {
            file_id: file_id.clone(),
            file_name: "a.png".to_string(),
        }
    );
    assert!(session.files().contains(&file_id));

    // And the bytes come back out of the store.
    let (meta, bytes) = session.fetch_file(&store, &file_id).await.expect("fetch");
    assert_eq!(meta.name, "a.png");
    assert_eq!(bytes, b"bytes");

    drop(events_tx);
    merger_task.await.expect("merger");
}

#[tokio::test(start_paused = true)]
async fn receipts_replace_wholesale_on_events() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(100));
    let session = session_over(channel.clone());

    let (events_tx, events_rx) = broadcast::channel(16);
    let merger_task = session.attach_events(events_rx);

    // Reading a message records a receipt server-side; the push event makes
    // every client re-fetch the full list.
    session
        .send_read_receipt(&MessageId::new("m1"))
        .await
        .expect("receipt");
    events_tx
        .send(ThreadEvent::ReadReceipt {
            sender: UserId::new("u-self"),
            message_id: MessageId::new("m1"),
        })
        .expect("push receipt event");
    settle(|| !session.receipts().is_empty()).await;

    assert_eq!(session.receipts().len(), 1);
    assert_eq!(session.receipts()[0].message_id, MessageId::new("m1"));

    drop(events_tx);
    merger_task.await.expect("merger");
}

#[tokio::test(start_paused = true)]
async fn issued_identity_drives_a_session() {
    init_tracing();
    // Mint a real identity the way a joining client would, then chat with it.
    let provider = MemoryCredentialProvider::new();
    let token = provider.issue().await.expect("issue");
    let refreshed = provider.refresh(&token.user).await.expect("refresh");
    assert_eq!(refreshed.user, token.user);

    let channel = Arc::new(MockChannel::new(777));
    let session = ChatSession::new(
        channel.clone(),
        LocalIdentity::new(token.user.clone(), "Newcomer"),
        ThreadId::new("t1"),
        SendPolicy::default(),
    );

    session.send_message("hello from a fresh identity");
    session.wait_outbound_idle().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].sender, token.user);
    assert_eq!(snapshot[0].delivery, DeliveryState::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn typing_indicator_round_trip() {
    init_tracing();
    let channel = Arc::new(MockChannel::new(100));
    let session = session_over(channel.clone());

    let (events_tx, events_rx) = broadcast::channel(16);
    let merger_task = session.attach_events(events_rx);

    // Cache the roster, then observe typing from a member and a stranger.
    session.refresh_members().await.expect("roster");
    for sender in ["u-bob", "u-stranger"] {
        events_tx
            .send(ThreadEvent::Typing {
                sender: UserId::new(sender),
                received_at: kaiwa_types::now_millis(),
            })
            .expect("push typing");
    }
    settle(|| !session.typing_users(kaiwa_types::now_millis()).is_empty()).await;

    // Only the roster member displays; the stranger's notice is ignored.
    let typing = session.typing_users(kaiwa_types::now_millis());
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].user, UserId::new("u-bob"));

    drop(events_tx);
    merger_task.await.expect("merger");
}

#[tokio::test(start_paused = true)]
async fn file_store_capability_is_independent_of_the_session() {
    init_tracing();
    // The FileStore seam works standalone, typed errors included.
    let store = MemoryFileStore::new();
    let missing = store.download(&FileId::new("ghost")).await;
    assert!(missing.is_err());

    let id = store.upload(b"standalone".to_vec()).await.expect("upload");
    assert_eq!(store.download(&id).await.expect("download"), b"standalone");
}
