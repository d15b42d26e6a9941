//! Persistent client-side storage for the auth token.
//!
//! [`LocalStorage`] keeps a small JSON key/value file, the way a browser keeps
//! `localStorage`; the token lives under [`AUTH_TOKEN_KEY`].

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub const AUTH_TOKEN_KEY: &str = "ldce_auth_token";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage file is not a JSON object")]
    NotAnObject,
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load_token(&self) -> Result<Option<String>, StorageError>;

    async fn save_token(&self, token: &str) -> Result<(), StorageError>;

    async fn clear_token(&self) -> Result<(), StorageError>;
}

/// The stored token, with read failures degraded to "no token".
pub async fn current_token(store: &dyn TokenStore) -> Option<String> {
    match store.load_token().await {
        Ok(token) => token.filter(|t| !t.trim().is_empty()),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read auth token; continuing without one");
            None
        }
    }
}

/// File-backed key/value storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.load().await?;
        Ok(items.get(key).and_then(Value::as_str).map(str::to_string))
    }

    pub async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.load().await?;
        items.insert(key.to_string(), Value::String(value.to_string()));
        self.save(&items).await
    }

    pub async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.load().await?;
        if items.remove(key).is_some() {
            self.save(&items).await?;
        }
        Ok(())
    }

    async fn load(&self) -> Result<Map<String, Value>, StorageError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&contents)? {
            Value::Object(items) => Ok(items),
            _ => Err(StorageError::NotAnObject),
        }
    }

    async fn save(&self, items: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let contents = serde_json::to_string_pretty(items)?;
        tokio::fs::write(&self.path, contents).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for LocalStorage {
    async fn load_token(&self) -> Result<Option<String>, StorageError> {
        self.get_item(AUTH_TOKEN_KEY).await
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        self.set_item(AUTH_TOKEN_KEY, token).await
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        self.remove_item(AUTH_TOKEN_KEY).await
    }
}

/// Token storage that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load_token(&self) -> Result<Option<String>, StorageError> {
        Ok(match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        })
    }

    async fn save_token(&self, token: &str) -> Result<(), StorageError> {
        match self.token.write() {
            Ok(mut slot) => *slot = Some(token.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(token.to_string()),
        }
        Ok(())
    }

    async fn clear_token(&self) -> Result<(), StorageError> {
        match self.token.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_storage_round_trips_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().join("nested").join("storage.json"));

        assert_eq!(storage.load_token().await.expect("load"), None);
        storage.save_token("abc.def.ghi").await.expect("save");
        assert_eq!(
            storage.load_token().await.expect("load"),
            Some("abc.def.ghi".to_string())
        );

        let raw = std::fs::read_to_string(storage.path()).expect("read file");
        let json: Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(json[AUTH_TOKEN_KEY], "abc.def.ghi");

        storage.clear_token().await.expect("clear");
        assert_eq!(storage.load_token().await.expect("load"), None);
    }

    #[tokio::test]
    async fn test_local_storage_keeps_other_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = LocalStorage::new(dir.path().join("storage.json"));
        storage.set_item("theme", "dark").await.expect("set");
        storage.save_token("t").await.expect("save");
        storage.clear_token().await.expect("clear");
        assert_eq!(
            storage.get_item("theme").await.expect("get"),
            Some("dark".to_string())
        );
    }

    #[tokio::test]
    async fn test_corrupt_storage_degrades_to_no_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "not json").expect("write");
        let storage = LocalStorage::new(path);

        assert!(storage.load_token().await.is_err());
        assert_eq!(current_token(&storage).await, None);
    }

    #[tokio::test]
    async fn test_memory_store_treats_blank_token_as_absent() {
        let store = MemoryTokenStore::with_token("   ");
        assert_eq!(current_token(&store).await, None);
        store.save_token("real").await.expect("save");
        assert_eq!(current_token(&store).await, Some("real".to_string()));
    }
}
