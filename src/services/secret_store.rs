//! Secret value storage, isolated from the metadata kept in state documents.

use crate::errors::CommandError;
use crate::services::cipher::SecretCipher;
use crate::utils::fs_atomic::{atomic_write_json, read_json_file};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), CommandError>;

    /// `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, CommandError>;

    /// Returns whether the key existed. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<bool, CommandError>;
}

/// File-backed store: one JSON object of key -> sealed value, encrypted with
/// AES-256-GCM and written atomically with mode 0600.
pub struct EncryptedFileSecretStore {
    path: PathBuf,
    cipher: SecretCipher,
    entries: RwLock<Map<String, Value>>,
}

impl EncryptedFileSecretStore {
    pub fn open(path: impl Into<PathBuf>, cipher: SecretCipher) -> Result<Self, CommandError> {
        let path = path.into();
        let entries = match read_json_file(&path) {
            Ok(None) => Map::new(),
            Ok(Some(Value::Object(map))) => map,
            Ok(Some(_)) => {
                return Err(CommandError::internal(format!(
                    "Secret store {} must contain a JSON object",
                    path.display()
                )))
            }
            Err(err) => {
                return Err(CommandError::internal(format!(
                    "Failed to load secret store: {}",
                    err
                )))
            }
        };
        Ok(Self {
            path,
            cipher,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), CommandError> {
        atomic_write_json(&self.path, &Value::Object(entries.clone()), 0o600)
            .map_err(|err| CommandError::internal(format!("Failed to save secret store: {}", err)))
    }
}

#[async_trait]
impl SecretStore for EncryptedFileSecretStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), CommandError> {
        let sealed = self.cipher.seal(value)?;
        let mut guard = self.entries.write().await;
        let previous = guard.insert(key.to_string(), Value::String(sealed));
        if let Err(err) = self.persist(&guard) {
            match previous {
                Some(prev) => guard.insert(key.to_string(), prev),
                None => guard.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CommandError> {
        let guard = self.entries.read().await;
        match guard.get(key).and_then(|v| v.as_str()) {
            Some(sealed) => self.cipher.unseal(sealed).map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CommandError> {
        let mut guard = self.entries.write().await;
        let Some(previous) = guard.remove(key) else {
            return Ok(false);
        };
        if let Err(err) = self.persist(&guard) {
            guard.insert(key.to_string(), previous);
            return Err(err);
        }
        Ok(true)
    }
}

#[derive(Default)]
pub struct MemorySecretStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), CommandError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CommandError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, CommandError> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
