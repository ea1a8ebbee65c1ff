//! Revoked-token store contract.
//!
//! Entries carry no expiry of their own; they live until the backing store is
//! cleaned up externally.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("blacklist store error: {0}")]
pub struct BlacklistError(pub String);

/// A set of previously issued token strings that must no longer be trusted.
#[async_trait]
pub trait Blacklist: Send + Sync {
    async fn contains(&self, token: &str) -> Result<bool, BlacklistError>;

    async fn insert(&self, token: &str) -> Result<(), BlacklistError>;

    /// Release the backing connection. Called once at shutdown.
    async fn close(&self) -> Result<(), BlacklistError> {
        Ok(())
    }
}

/// Process-local blacklist.
///
/// Intended for tests/dev and single-instance deployments.
#[derive(Debug, Default)]
pub struct InMemoryBlacklist {
    tokens: RwLock<HashSet<String>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Blacklist for InMemoryBlacklist {
    async fn contains(&self, token: &str) -> Result<bool, BlacklistError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| BlacklistError("lock poisoned".to_string()))?;
        Ok(tokens.contains(token))
    }

    async fn insert(&self, token: &str) -> Result<(), BlacklistError> {
        let mut tokens = self
            .tokens
            .write()
            .map_err(|_| BlacklistError("lock poisoned".to_string()))?;
        tokens.insert(token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inserted_tokens_are_reported() {
        let blacklist = InMemoryBlacklist::new();
        assert!(!blacklist.contains("abc").await.unwrap());

        blacklist.insert("abc").await.unwrap();
        assert!(blacklist.contains("abc").await.unwrap());
        assert!(!blacklist.contains("abd").await.unwrap());
    }
}
