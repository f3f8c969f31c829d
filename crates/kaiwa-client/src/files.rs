//! Client-side attachment registry.
//!
//! Tracks the files this thread knows about — seeded from history, grown by
//! inbound file-upload notices — and, once a file's bytes have been fetched,
//! where the local copy lives. Duplicate notices for a known file id are
//! ignored; the first metadata wins.

use indexmap::IndexMap;
use kaiwa_types::{FileId, FileMetadata};
use parking_lot::Mutex;

/// One known attachment, plus the local fetch state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisteredFile {
    pub name: String,
    pub uploaded_at: u64,
    /// Where the downloaded bytes live locally; `None` until fetched.
    pub local_ref: Option<String>,
}

/// Known attachments, in discovery order.
#[derive(Default)]
pub struct FileRegistry {
    files: Mutex<IndexMap<FileId, RegisteredFile>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register attachments, skipping ids already known.
    pub fn add_files(&self, metas: impl IntoIterator<Item = FileMetadata>) {
        let mut files = self.files.lock();
        for meta in metas {
            files.entry(meta.id).or_insert(RegisteredFile {
                name: meta.name,
                uploaded_at: meta.uploaded_at,
                local_ref: None,
            });
        }
    }

    /// Record where a fetched file's bytes live. Returns false for unknown
    /// ids (nothing to attach the ref to).
    pub fn set_local_ref(&self, file_id: &FileId, local_ref: impl Into<String>) -> bool {
        match self.files.lock().get_mut(file_id) {
            Some(file) => {
                file.local_ref = Some(local_ref.into());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, file_id: &FileId) -> Option<RegisteredFile> {
        self.files.lock().get(file_id).cloned()
    }

    pub fn contains(&self, file_id: &FileId) -> bool {
        self.files.lock().contains_key(file_id)
    }

    /// All known attachments in discovery order.
    pub fn all(&self) -> Vec<(FileId, RegisteredFile)> {
        self.files
            .lock()
            .iter()
            .map(|(id, file)| (id.clone(), file.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.files.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
