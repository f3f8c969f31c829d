//! User-facing identity records: chat tokens and per-user configuration.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// A chat access token issued for one user identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserToken {
    pub user: UserId,
    pub token: String,
    /// Expiry (unix millis).
    pub expires_at: u64,
}

impl UserToken {
    /// Whether the token is still usable at `now`.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Per-user display configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    pub display_name: String,
    pub emoji: String,
}

impl UserConfig {
    pub fn new(display_name: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            emoji: emoji.into(),
        }
    }
}
