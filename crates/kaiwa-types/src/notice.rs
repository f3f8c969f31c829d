//! File-upload notices embedded in plain-text messages.
//!
//! When a file lands in the store, the backend announces it by sending an
//! ordinary chat message whose content is a small JSON document:
//!
//! ```json
//! {"event": "FileUpload", "fileId": "…", "fileName": "…"}
//! ```
//!
//! [`ParsedContent::parse`] attempts a strict shape match and degrades to
//! plain text on any mismatch — wrong tag, wrong field type, or content that
//! isn't JSON at all. Parse failure is a type-tag fallback, never an error.

use serde::{Deserialize, Serialize};

use crate::ids::FileId;

/// The structured file-upload notice carried inside a message body.
///
/// Serializes with the `event` tag the wire shape requires; unknown extra
/// keys are tolerated on input, but a missing or mistyped required field
/// rejects the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename = "FileUpload", rename_all = "camelCase")]
pub struct FileUploadNotice {
    pub file_id: FileId,
    pub file_name: String,
}

impl FileUploadNotice {
    pub fn new(file_id: FileId, file_name: impl Into<String>) -> Self {
        Self {
            file_id,
            file_name: file_name.into(),
        }
    }

    /// Encode as the message content string to send through the channel.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// A message body, classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedContent<'a> {
    /// Ordinary chat text (including anything that failed the notice match).
    PlainText(&'a str),
    /// A well-formed file-upload notice.
    FileUpload(FileUploadNotice),
}

impl<'a> ParsedContent<'a> {
    /// Classify a message body. Total: never fails, never panics.
    pub fn parse(content: &'a str) -> ParsedContent<'a> {
        match serde_json::from_str::<FileUploadNotice>(content) {
            Ok(notice) => ParsedContent::FileUpload(notice),
            Err(_) => ParsedContent::PlainText(content),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
