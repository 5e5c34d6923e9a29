//! Bearer token storage.
//!
//! The token is issued by the authentication service at login and kept in
//! durable client-side storage. A missing or blank token means the user must
//! sign in again; nothing here talks to the network.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::types::Result;

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Current token, or `None` when the user is signed out.
    async fn token(&self) -> Result<Option<String>>;
}

/// Token kept in a file, one line, surrounding whitespace ignored.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a token, creating parent directories as needed.
    pub async fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, token.trim()).await?;
        Ok(())
    }

    /// Remove the stored token (sign-out). Missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn token(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fixed token, for callers that already hold one (and for tests).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore {
    token: Option<String>,
}

impl StaticTokenStore {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn token(&self) -> Result<Option<String>> {
        Ok(self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("auth").join("token"));

        assert_eq!(store.token().await.unwrap(), None);

        store.save("  abc123\n").await.unwrap();
        assert_eq!(store.token().await.unwrap().as_deref(), Some("abc123"));

        store.clear().await.unwrap();
        assert_eq!(store.token().await.unwrap(), None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn test_blank_file_is_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "   \n").unwrap();

        let store = FileTokenStore::new(path);
        assert_eq!(store.token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_store() {
        assert_eq!(
            StaticTokenStore::new("tok").token().await.unwrap().as_deref(),
            Some("tok")
        );
        assert_eq!(StaticTokenStore::new("  ").token().await.unwrap(), None);
        assert_eq!(StaticTokenStore::signed_out().token().await.unwrap(), None);
    }
}
