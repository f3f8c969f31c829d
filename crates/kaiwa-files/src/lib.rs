//! Attachment storage capability.
//!
//! A [`FileStore`] keeps two things: raw attachment bytes keyed by
//! [`FileId`], and a per-thread metadata table (name + upload time) so a
//! thread can list its attachments without touching the blobs. Concrete
//! backends (cloud blob + table storage) live behind the trait; this crate
//! ships [`MemoryFileStore`] for tests and single-process deployments.
//!
//! Missing files surface as the typed [`FileStoreError::NotFound`] so
//! HTTP-style boundaries can map them to a specific status instead of a
//! generic failure.

mod memory;

pub use memory::MemoryFileStore;

use async_trait::async_trait;
use kaiwa_types::{FileId, FileMetadata, ThreadId};
use thiserror::Error;

/// Errors from attachment storage.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// No blob or metadata under the requested id.
    #[error("file not found: {0}")]
    NotFound(FileId),
    /// The storage backend failed (connectivity, quota, …).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Blob + metadata storage for chat attachments.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store raw bytes, minting a fresh [`FileId`] for them.
    async fn upload(&self, bytes: Vec<u8>) -> Result<FileId, FileStoreError>;

    /// Fetch the raw bytes for a stored file.
    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>, FileStoreError>;

    /// Record (or overwrite) a thread's metadata row for a file.
    async fn put_metadata(
        &self,
        thread_id: &ThreadId,
        meta: FileMetadata,
    ) -> Result<(), FileStoreError>;

    /// Look up one file's metadata within a thread.
    async fn get_metadata(
        &self,
        thread_id: &ThreadId,
        file_id: &FileId,
    ) -> Result<FileMetadata, FileStoreError>;

    /// All metadata rows for a thread, oldest upload first.
    async fn list_metadata(&self, thread_id: &ThreadId) -> Result<Vec<FileMetadata>, FileStoreError>;
}
