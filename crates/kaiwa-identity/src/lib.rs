//! Identity capabilities: chat token issuance and per-user configuration.
//!
//! [`CredentialProvider`] mints and refreshes the chat access tokens the
//! realtime backend expects; [`UserConfigStore`] keeps the display name and
//! emoji a user picked when joining. Both are seams — production backends
//! (a hosted identity service, a durable config table) implement the traits,
//! while [`MemoryCredentialProvider`] and [`MemoryUserConfigStore`] cover
//! tests and single-process deployments.
//!
//! Lookup misses are typed ([`CredentialError::UnknownIdentity`],
//! [`UserConfigError::UserNotFound`]) rather than generic failures, so
//! HTTP-style boundaries can map them to specific statuses.

mod memory;

pub use memory::{MemoryCredentialProvider, MemoryUserConfigStore};

use async_trait::async_trait;
use kaiwa_types::{UserConfig, UserId, UserToken};
use thiserror::Error;

/// Errors from token issuance.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Refresh requested for an identity this provider never issued.
    #[error("unknown identity: {0}")]
    UnknownIdentity(UserId),
    /// The identity backend failed (connectivity, throttling, …).
    #[error("identity backend failure: {0}")]
    Backend(String),
}

/// Mints chat access tokens.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Create a fresh identity and issue its first token.
    async fn issue(&self) -> Result<UserToken, CredentialError>;

    /// Issue a new token for an existing identity.
    async fn refresh(&self, identity: &UserId) -> Result<UserToken, CredentialError>;
}

/// Errors from per-user configuration storage.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UserConfigError {
    #[error("user not found: {0}")]
    UserNotFound(UserId),
    #[error("user already exists: {0}")]
    UserAlreadyExists(UserId),
}

/// Stores each user's display configuration.
#[async_trait]
pub trait UserConfigStore: Send + Sync {
    /// Register a user's configuration. Fails if the user is already known.
    async fn add_user(&self, user_id: &UserId, config: UserConfig) -> Result<(), UserConfigError>;

    /// Fetch a user's configuration.
    async fn get_user(&self, user_id: &UserId) -> Result<UserConfig, UserConfigError>;
}
