//! In-memory identity backends.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kaiwa_types::{UserConfig, UserId, UserToken, now_millis};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

use crate::{CredentialError, CredentialProvider, UserConfigError, UserConfigStore};

/// Issued tokens live this long.
const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Length of generated token strings.
const TOKEN_LEN: usize = 48;

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Process-local [`CredentialProvider`]: mints random user ids and opaque
/// alphanumeric tokens. Refresh only works for identities this provider
/// issued.
#[derive(Default)]
pub struct MemoryCredentialProvider {
    issued: DashMap<UserId, UserToken>,
}

impl MemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self, user: UserId) -> UserToken {
        let token = UserToken {
            user: user.clone(),
            token: random_token(),
            expires_at: now_millis() + TOKEN_TTL.as_millis() as u64,
        };
        self.issued.insert(user, token.clone());
        token
    }
}

#[async_trait]
impl CredentialProvider for MemoryCredentialProvider {
    async fn issue(&self) -> Result<UserToken, CredentialError> {
        let user = UserId::new(format!("8:kaiwa:{}", uuid::Uuid::new_v4()));
        debug!(user = %user, "issuing identity");
        Ok(self.mint(user))
    }

    async fn refresh(&self, identity: &UserId) -> Result<UserToken, CredentialError> {
        if !self.issued.contains_key(identity) {
            return Err(CredentialError::UnknownIdentity(identity.clone()));
        }
        debug!(user = %identity, "refreshing token");
        Ok(self.mint(identity.clone()))
    }
}

/// Process-local [`UserConfigStore`] over a concurrent map.
#[derive(Default)]
pub struct MemoryUserConfigStore {
    users: DashMap<UserId, UserConfig>,
}

impl MemoryUserConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserConfigStore for MemoryUserConfigStore {
    async fn add_user(&self, user_id: &UserId, config: UserConfig) -> Result<(), UserConfigError> {
        if self.users.contains_key(user_id) {
            return Err(UserConfigError::UserAlreadyExists(user_id.clone()));
        }
        self.users.insert(user_id.clone(), config);
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> Result<UserConfig, UserConfigError> {
        self.users
            .get(user_id)
            .map(|config| config.clone())
            .ok_or_else(|| UserConfigError::UserNotFound(user_id.clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issue_creates_distinct_identities() {
        let provider = MemoryCredentialProvider::new();
        let a = provider.issue().await.unwrap();
        let b = provider.issue().await.unwrap();
        assert_ne!(a.user, b.user);
        assert_ne!(a.token, b.token);
        assert_eq!(a.token.len(), TOKEN_LEN);
    }

    #[tokio::test]
    async fn test_refresh_rotates_token_for_same_user() {
        let provider = MemoryCredentialProvider::new();
        let first = provider.issue().await.unwrap();
        let second = provider.refresh(&first.user).await.unwrap();
        assert_eq!(second.user, first.user);
        assert_ne!(second.token, first.token);
    }

    #[tokio::test]
    async fn test_refresh_unknown_identity_is_typed() {
        let provider = MemoryCredentialProvider::new();
        let err = provider.refresh(&UserId::new("stranger")).await.unwrap_err();
        assert!(matches!(err, CredentialError::UnknownIdentity(_)));
    }

    #[tokio::test]
    async fn test_issued_token_is_valid_now() {
        let provider = MemoryCredentialProvider::new();
        let token = provider.issue().await.unwrap();
        assert!(token.is_valid_at(now_millis()));
    }

    #[tokio::test]
    async fn test_config_store_add_then_get() {
        let store = MemoryUserConfigStore::new();
        let user = UserId::new("u1");
        let config = UserConfig::new("Alice", "🦀");
        store.add_user(&user, config.clone()).await.unwrap();
        assert_eq!(store.get_user(&user).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_config_store_duplicate_add_rejected() {
        let store = MemoryUserConfigStore::new();
        let user = UserId::new("u1");
        store.add_user(&user, UserConfig::new("Alice", "🦀")).await.unwrap();
        let err = store.add_user(&user, UserConfig::new("Bob", "🐙")).await.unwrap_err();
        assert_eq!(err, UserConfigError::UserAlreadyExists(user.clone()));
        // Original config untouched
        assert_eq!(store.get_user(&user).await.unwrap().display_name, "Alice");
    }

    #[tokio::test]
    async fn test_config_store_missing_user_is_typed() {
        let store = MemoryUserConfigStore::new();
        let err = store.get_user(&UserId::new("ghost")).await.unwrap_err();
        assert_eq!(err, UserConfigError::UserNotFound(UserId::new("ghost")));
    }
}
