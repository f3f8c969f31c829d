//! The reconciling message timeline.
//!
//! One ordered, deduplicated collection of chat-visible entries, shared by
//! the outbound send pipeline and the inbound event merger. Both writers go
//! through [`Timeline::upsert`], which must be idempotent and commutative
//! with respect to their interleavings — a server-confirmed echo of our own
//! message can arrive before or after the pipeline's confirmation fetch, and
//! either order has to converge on a single visible entry.
//!
//! # Matching
//!
//! - Primary key: [`ClientMessageId`] — present from composition onward.
//! - Secondary key: the server-assigned [`MessageId`] — an upsert whose
//!   client id is unknown but whose server id matches an existing entry
//!   merges into that entry, and a merge that *gives* an entry its server id
//!   collapses any second entry already carrying it. This closes the
//!   echo-before-confirm race without ever showing a duplicate.
//!
//! # Ordering
//!
//! Snapshots sort by server timestamp ascending; entries the server hasn't
//! timestamped yet sort after all timestamped ones and keep their relative
//! submission order (the sort is stable and insertion order is preserved
//! underneath).

use indexmap::IndexMap;
use kaiwa_types::{ClientMessageId, FileId, MessageId, UserId};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::trace;

// ============================================================================
// Entry types
// ============================================================================

/// What a timeline entry displays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    FileReference { file_id: FileId, file_name: String },
}

impl MessageContent {
    /// The displayable text, for plain entries.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::FileReference { .. } => None,
        }
    }
}

/// Delivery progress of an entry.
///
/// `Pending` entries are locally composed and awaiting the backend;
/// `Confirmed` entries carry a durable server id and timestamp, frozen
/// thereafter. A late server echo may still upgrade `Failed` to `Confirmed`
/// (the send worked, only our bookkeeping said otherwise) — the reverse
/// never happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum DeliveryState {
    Pending,
    Confirmed,
    Failed,
}

impl DeliveryState {
    /// Monotonic progression rank: merges keep the further-along state.
    fn rank(self) -> u8 {
        match self {
            DeliveryState::Pending => 0,
            DeliveryState::Failed => 1,
            DeliveryState::Confirmed => 2,
        }
    }
}

/// One chat-visible item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Client-generated correlation id; the upsert key while `server_id` is
    /// absent.
    pub client_id: ClientMessageId,
    /// Server-assigned durable id. Never un-set once present.
    pub server_id: Option<MessageId>,
    pub sender: UserId,
    pub sender_display_name: String,
    pub content: MessageContent,
    /// Server-assigned ordering timestamp (unix millis); `None` until
    /// confirmation, when ordering falls back to submission order.
    pub created_at: Option<u64>,
    pub delivery: DeliveryState,
}

impl TimelineEntry {
    /// A freshly-composed local entry, visible before the network confirms it.
    pub fn pending(
        client_id: ClientMessageId,
        sender: UserId,
        sender_display_name: impl Into<String>,
        content: MessageContent,
    ) -> Self {
        Self {
            client_id,
            server_id: None,
            sender,
            sender_display_name: sender_display_name.into(),
            content,
            created_at: None,
            delivery: DeliveryState::Pending,
        }
    }

    /// A server-confirmed entry (inbound events, confirmation fetches).
    pub fn confirmed(
        client_id: ClientMessageId,
        server_id: MessageId,
        sender: UserId,
        sender_display_name: impl Into<String>,
        content: MessageContent,
        created_at: u64,
    ) -> Self {
        Self {
            client_id,
            server_id: Some(server_id),
            sender,
            sender_display_name: sender_display_name.into(),
            content,
            created_at: Some(created_at),
            delivery: DeliveryState::Confirmed,
        }
    }

    /// Fold `new` into `self`. New non-null fields win, except that a
    /// confirmed entry's `server_id` and `created_at` are frozen and the
    /// delivery state only moves forward.
    fn merge_from(&mut self, new: &TimelineEntry) {
        let frozen = self.delivery == DeliveryState::Confirmed;
        if self.server_id.is_none() {
            self.server_id = new.server_id.clone();
        }
        if !frozen {
            if let Some(ts) = new.created_at {
                self.created_at = Some(ts);
            }
            self.content = new.content.clone();
            if !new.sender_display_name.is_empty() {
                self.sender_display_name = new.sender_display_name.clone();
            }
        }
        if new.delivery.rank() > self.delivery.rank() {
            self.delivery = new.delivery;
        }
    }
}

/// Ordering key over timeline entries: timestamped entries ascend by
/// timestamp; untimestamped entries sort after every timestamped one.
///
/// Ties (equal timestamps, or the whole untimestamped tail) are left to the
/// stable sort, which preserves insertion order — so repeated re-sorts never
/// reorder two entries whose relative order was already fixed.
pub fn ordering_key(entry: &TimelineEntry) -> (bool, u64) {
    match entry.created_at {
        Some(ts) => (false, ts),
        None => (true, 0),
    }
}

// ============================================================================
// Store
// ============================================================================

/// Errors from timeline mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimelineError {
    #[error("an entry with client id {0} already exists")]
    DuplicateClientId(ClientMessageId),
}

/// The shared message store. Interior mutability: both writers hold an
/// `Arc<Timeline>` and mutate through atomic operations only — no caller
/// ever copies entries out, edits, and writes back.
#[derive(Default)]
pub struct Timeline {
    entries: Mutex<IndexMap<ClientMessageId, TimelineEntry>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-merge, keyed by client id with server id as the secondary
    /// match. Returns the stored, merged entry. Idempotent: applying the
    /// same fully-resolved entry twice leaves the store unchanged.
    pub fn upsert(&self, entry: TimelineEntry) -> TimelineEntry {
        let mut entries = self.entries.lock();

        let key = if entries.contains_key(&entry.client_id) {
            entry.client_id
        } else if let Some(existing) = Self::key_by_server_id(&entries, entry.server_id.as_ref()) {
            // Unknown client id but known server id: this is another
            // writer's view of an entry we already hold. The first-inserted
            // entry's client id stays the key.
            trace!(server_id = ?entry.server_id, "upsert matched by server id");
            existing
        } else {
            entries.insert(entry.client_id, entry.clone());
            return entry;
        };

        let merged = match entries.get_mut(&key) {
            Some(stored) => {
                stored.merge_from(&entry);
                stored.clone()
            }
            // Key came from the map under the same lock; unreachable in
            // practice, but degrade to a plain insert rather than panic.
            None => {
                entries.insert(entry.client_id, entry.clone());
                entry
            }
        };

        Self::collapse_duplicate(&mut entries, &merged);
        // Re-read: the collapse may have folded this entry into an
        // earlier-inserted one, or folded another writer's fields in.
        if let Some(stored) = entries.get(&key) {
            return stored.clone();
        }
        Self::key_by_server_id(&entries, merged.server_id.as_ref())
            .and_then(|survivor| entries.get(&survivor).cloned())
            .unwrap_or(merged)
    }

    /// Insert a brand-new entry; fails if the client id is already present.
    pub fn append(&self, entry: TimelineEntry) -> Result<(), TimelineError> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.client_id) {
            return Err(TimelineError::DuplicateClientId(entry.client_id));
        }
        entries.insert(entry.client_id, entry);
        Ok(())
    }

    /// Sorted view of the store at call time (not a live view).
    pub fn snapshot(&self) -> Vec<TimelineEntry> {
        let mut all: Vec<TimelineEntry> = self.entries.lock().values().cloned().collect();
        all.sort_by_key(ordering_key);
        all
    }

    /// Look up by client correlation id.
    pub fn get(&self, client_id: &ClientMessageId) -> Option<TimelineEntry> {
        self.entries.lock().get(client_id).cloned()
    }

    /// Look up by server-assigned id.
    pub fn find_by_server_id(&self, server_id: &MessageId) -> Option<TimelineEntry> {
        self.entries
            .lock()
            .values()
            .find(|entry| entry.server_id.as_ref() == Some(server_id))
            .cloned()
    }

    /// Entries authored by anyone but `self_id`, in snapshot order.
    pub fn from_other_senders(&self, self_id: &UserId) -> Vec<TimelineEntry> {
        let mut others: Vec<TimelineEntry> = self
            .entries
            .lock()
            .values()
            .filter(|entry| &entry.sender != self_id)
            .cloned()
            .collect();
        others.sort_by_key(ordering_key);
        others
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn key_by_server_id(
        entries: &IndexMap<ClientMessageId, TimelineEntry>,
        server_id: Option<&MessageId>,
    ) -> Option<ClientMessageId> {
        let server_id = server_id?;
        entries
            .iter()
            .find(|(_, entry)| entry.server_id.as_ref() == Some(server_id))
            .map(|(key, _)| *key)
    }

    /// After a merge gives `merged` a server id, fold away any *other* entry
    /// carrying the same server id (an echo that arrived under its own
    /// client id before the confirmation landed). The earlier-inserted entry
    /// survives, keeping its position in the untimestamped tail.
    fn collapse_duplicate(
        entries: &mut IndexMap<ClientMessageId, TimelineEntry>,
        merged: &TimelineEntry,
    ) {
        let Some(server_id) = merged.server_id.as_ref() else {
            return;
        };

        let duplicates: Vec<ClientMessageId> = entries
            .iter()
            .filter(|(key, entry)| {
                **key != merged.client_id && entry.server_id.as_ref() == Some(server_id)
            })
            .map(|(key, _)| *key)
            .collect();

        if duplicates.is_empty() {
            return;
        }

        for dup_key in duplicates {
            let (keep, fold) = match (
                entries.get_index_of(&merged.client_id),
                entries.get_index_of(&dup_key),
            ) {
                (Some(a), Some(b)) if a <= b => (merged.client_id, dup_key),
                (Some(_), Some(_)) => (dup_key, merged.client_id),
                _ => continue,
            };
            trace!(server_id = %server_id, keep = %keep, fold = %fold,
                "collapsing duplicate entries for one server id");
            if let Some(folded) = entries.shift_remove(&fold)
                && let Some(kept) = entries.get_mut(&keep)
            {
                kept.merge_from(&folded);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
