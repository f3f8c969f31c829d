//! Shared identity and message types for Kaiwa.
//!
//! This crate is the relational foundation: typed IDs, wire-level message
//! records, thread membership, read receipts, file metadata, and the
//! file-upload notice parser. It has **no internal kaiwa dependencies** —
//! a pure leaf crate that other crates build on.
//!
//! # Entity-Relationship Overview
//!
//! ```text
//! Thread (ThreadId) ← conversation grouping messages and members
//!     └── contains Message (MessageId, server-assigned)
//!     └── joined by Member (UserId + display name)
//!     └── holds FileMetadata (FileId, per-thread attachment table)
//!
//! User (UserId) ← backend-issued identity
//!     └── authenticates via UserToken
//!     └── configures UserConfig (display name + emoji)
//!     └── composes messages, correlated by ClientMessageId until the
//!         server assigns a MessageId
//! ```
//!
//! # Key Types
//!
//! |---------------------|---------------------------------------------|
//! | Type                | Purpose                                     |
//! |---------------------|---------------------------------------------|
//! | [`ClientMessageId`] | Client-generated send correlation (UUIDv4)  |
//! | [`MessageId`]       | Server-assigned durable message id          |
//! | [`UserId`]          | Backend-issued user identity                |
//! | [`ThreadId`]        | Which conversation                          |
//! | [`FileId`]          | Which stored attachment                     |
//! | [`MessageRecord`]   | Canonical message as the server returns it  |
//! | [`ThreadMember`]    | Thread roster entry                         |
//! | [`ReadReceipt`]     | Who read what, when                         |
//! | [`FileMetadata`]    | Attachment name + upload time               |
//! | [`ParsedContent`]   | Plain text vs file-upload notice            |
//! |---------------------|---------------------------------------------|

pub mod file;
pub mod ids;
pub mod message;
pub mod notice;
pub mod user;

// Re-export primary types at crate root for convenience.
pub use file::FileMetadata;
pub use ids::{ClientMessageId, FileId, MessageId, ThreadId, UserId};
pub use message::{MessageRecord, MessageType, ReadReceipt, ThreadMember};
pub use notice::{FileUploadNotice, ParsedContent};
pub use user::{UserConfig, UserToken};

/// Current time as Unix milliseconds. Used by constructors throughout the
/// workspace.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
