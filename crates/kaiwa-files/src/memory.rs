//! In-memory [`FileStore`] backend.

use async_trait::async_trait;
use dashmap::DashMap;
use kaiwa_types::{FileId, FileMetadata, ThreadId};
use tracing::debug;

use crate::{FileStore, FileStoreError};

/// Process-local attachment storage: a blob map plus a per-thread metadata
/// table. Every upload mints a random UUIDv4 file id, the same scheme the
/// backing service uses.
#[derive(Default)]
pub struct MemoryFileStore {
    blobs: DashMap<FileId, Vec<u8>>,
    tables: DashMap<ThreadId, Vec<FileMetadata>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload(&self, bytes: Vec<u8>) -> Result<FileId, FileStoreError> {
        let file_id = FileId::new(uuid::Uuid::new_v4().to_string());
        debug!(file_id = %file_id, size = bytes.len(), "storing blob");
        self.blobs.insert(file_id.clone(), bytes);
        Ok(file_id)
    }

    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, FileStoreError> {
        self.blobs
            .get(file_id)
            .map(|bytes| bytes.clone())
            .ok_or_else(|| FileStoreError::NotFound(file_id.clone()))
    }

    async fn put_metadata(
        &self,
        thread_id: &ThreadId,
        meta: FileMetadata,
    ) -> Result<(), FileStoreError> {
        let mut rows = self.tables.entry(thread_id.clone()).or_default();
        match rows.iter_mut().find(|row| row.id == meta.id) {
            Some(row) => *row = meta,
            None => rows.push(meta),
        }
        Ok(())
    }

    async fn get_metadata(
        &self,
        thread_id: &ThreadId,
        file_id: &FileId,
    ) -> Result<FileMetadata, FileStoreError> {
        self.tables
            .get(thread_id)
            .and_then(|rows| rows.iter().find(|row| &row.id == file_id).cloned())
            .ok_or_else(|| FileStoreError::NotFound(file_id.clone()))
    }

    async fn list_metadata(&self, thread_id: &ThreadId) -> Result<Vec<FileMetadata>, FileStoreError> {
        Ok(self
            .tables
            .get(thread_id)
            .map(|rows| rows.clone())
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
