//! Attachment metadata.

use serde::{Deserialize, Serialize};

use crate::ids::FileId;

/// Metadata for one stored attachment, recorded per thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: FileId,
    pub name: String,
    /// When the file landed in the store (unix millis).
    pub uploaded_at: u64,
}

impl FileMetadata {
    pub fn new(id: FileId, name: impl Into<String>, uploaded_at: u64) -> Self {
        Self {
            id,
            name: name.into(),
            uploaded_at,
        }
    }
}
