//! Typed identifiers for users, threads, messages, and files.
//!
//! Server-assigned identifiers ([`UserId`], [`ThreadId`], [`MessageId`],
//! [`FileId`]) are opaque strings — the backend mints them and the client
//! never inspects their structure. They're newtyped so a message id can't be
//! passed where a user id is expected.
//!
//! [`ClientMessageId`] is the one client-minted id: a random UUIDv4 (122 bits
//! of entropy) that correlates a locally-composed message with its later
//! server confirmation. The `short()` form (first 8 hex chars) is for
//! human-facing logs — never used as a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A backend-issued user identity.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// A conversation thread.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

/// A server-assigned durable message id. Absent until the backend accepts
/// the message; immutable once assigned.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

/// A stored attachment.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_opaque_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a backend-issued identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwrap into the raw string.
            pub fn into_string(self) -> String {
                self.0
            }

            /// First 8 characters — for human display only, not lookup.
            pub fn short(&self) -> &str {
                self.0.get(..8).unwrap_or(&self.0)
            }

            /// True for the empty identifier — a sentinel, never backend-issued.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<String> for $T {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $T {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_opaque_id!(UserId, "UserId");
impl_opaque_id!(ThreadId, "ThreadId");
impl_opaque_id!(MessageId, "MessageId");
impl_opaque_id!(FileId, "FileId");

// ── ClientMessageId ─────────────────────────────────────────────────────────

/// Client-generated send correlation id (random UUIDv4).
///
/// Present from message composition until the server confirmation supplies a
/// durable [`MessageId`]; used as the timeline upsert key while the server id
/// is absent. Drawn from a 122-bit space so collisions between concurrent
/// senders are practically impossible.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientMessageId(uuid::Uuid);

impl ClientMessageId {
    /// Create a fresh random correlation id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// First 8 hex characters — for human display only, not lookup.
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Full 32-character hex string (no hyphens).
    pub fn to_hex(&self) -> String {
        self.0.as_simple().to_string()
    }

    /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl Default for ClientMessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<uuid::Uuid> for ClientMessageId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}

impl From<ClientMessageId> for uuid::Uuid {
    fn from(id: ClientMessageId) -> uuid::Uuid {
        id.0
    }
}

impl fmt::Display for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full UUID with hyphens for log readability
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClientMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientMessageId({})", self.short())
    }
}

// ============================================================================
// Tests
// ============================================================================
