use crate::errors::CommandError;
use crate::utils::fs_atomic::{atomic_write_json, read_json_file};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

/// One persisted JSON document of key/value entries. Every mutation is a
/// read-modify-write of the whole document; concurrent writers are
/// last-write-wins.
#[derive(Clone)]
pub struct StateService {
    file_path: Option<PathBuf>,
    entries: Arc<RwLock<Map<String, Value>>>,
}

impl StateService {
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, CommandError> {
        let file_path = file_path.into();
        let loaded = read_json_file(&file_path).map_err(|err| {
            CommandError::internal(format!(
                "Failed to load state file {}: {}",
                file_path.display(),
                err
            ))
        })?;
        let entries = match loaded {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(CommandError::internal(format!(
                    "State file {} must contain a JSON object",
                    file_path.display()
                )))
            }
        };
        Ok(Self {
            file_path: Some(file_path),
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    /// Non-persisted document, for tests and throwaway sessions.
    pub fn in_memory() -> Self {
        Self {
            file_path: None,
            entries: Arc::new(RwLock::new(Map::new())),
        }
    }

    fn persist(&self, entries: &Map<String, Value>) -> Result<(), CommandError> {
        let Some(path) = &self.file_path else {
            return Ok(());
        };
        atomic_write_json(path, &Value::Object(entries.clone()), 0o600)
            .map_err(|err| CommandError::internal(format!("Failed to save state: {}", err)))
    }

    pub fn get_value(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .get(key)
            .cloned()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CommandError> {
        match self.get_value(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value).map(Some).map_err(|err| {
                CommandError::internal(format!("State entry '{}' is malformed: {}", key, err))
            }),
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, CommandError> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CommandError> {
        let value = serde_json::to_value(value).map_err(|err| {
            CommandError::internal(format!("Failed to serialize '{}': {}", key, err))
        })?;
        let mut guard = self.entries.write().unwrap_or_else(|err| err.into_inner());
        guard.insert(key.to_string(), value);
        self.persist(&guard)
    }

    pub fn unset(&self, key: &str) -> Result<bool, CommandError> {
        let mut guard = self.entries.write().unwrap_or_else(|err| err.into_inner());
        let removed = guard.remove(key).is_some();
        if removed {
            self.persist(&guard)?;
        }
        Ok(removed)
    }

    /// Applies `apply` to the current value of `key` (default when absent)
    /// and persists the result before returning `apply`'s output.
    pub fn update<T, R>(&self, key: &str, apply: impl FnOnce(&mut T) -> R) -> Result<R, CommandError>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        let mut guard = self.entries.write().unwrap_or_else(|err| err.into_inner());
        let mut current: T = match guard.get(key) {
            None | Some(Value::Null) => T::default(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|err| {
                CommandError::internal(format!("State entry '{}' is malformed: {}", key, err))
            })?,
        };
        let out = apply(&mut current);
        let value = serde_json::to_value(&current).map_err(|err| {
            CommandError::internal(format!("Failed to serialize '{}': {}", key, err))
        })?;
        guard.insert(key.to_string(), value);
        self.persist(&guard)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file() -> PathBuf {
        std::env::temp_dir().join(format!("callsign-state-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn values_survive_reopen() {
        let path = tmp_file();
        let state = StateService::open(&path).expect("open");
        state.set("callsign.historyLimit", &20).expect("set");
        state
            .update("callsign.specUrls", |urls: &mut Vec<String>| {
                urls.push("https://a/openapi.json".to_string())
            })
            .expect("update");

        let reopened = StateService::open(&path).expect("reopen");
        assert_eq!(reopened.get::<usize>("callsign.historyLimit").unwrap(), Some(20));
        let urls: Vec<String> = reopened.get_or_default("callsign.specUrls").unwrap();
        assert_eq!(urls, vec!["https://a/openapi.json".to_string()]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn unset_reports_presence() {
        let state = StateService::in_memory();
        state.set("k", &"v").unwrap();
        assert!(state.unset("k").unwrap());
        assert!(!state.unset("k").unwrap());
        assert!(state.get::<String>("k").unwrap().is_none());
    }

    #[test]
    fn non_object_document_is_rejected() {
        let path = tmp_file();
        std::fs::write(&path, "[1,2]").unwrap();
        assert!(StateService::open(&path).is_err());
        let _ = std::fs::remove_file(path);
    }
}
