use std::env;
use std::path::{Path, PathBuf};

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn env_path(key: &str) -> Option<PathBuf> {
    normalize_env_path(env::var(key).ok())
}

fn resolve_xdg_state_dir() -> Option<PathBuf> {
    if let Some(path) = env_path("XDG_STATE_HOME") {
        return Some(path);
    }
    env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("state"))
}

pub fn resolve_state_dir() -> PathBuf {
    if let Some(path) = env_path("CALLSIGN_STATE_DIR") {
        return path;
    }
    if let Some(path) = resolve_xdg_state_dir() {
        return path.join("callsign");
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".callsign")
}

/// Locations of every document the host persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub global_state: PathBuf,
    pub workspace_state: PathBuf,
    pub secrets: PathBuf,
    pub key: PathBuf,
}

impl StatePaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            global_state: dir.join("global-state.json"),
            workspace_state: dir.join("workspace-state.json"),
            secrets: dir.join("secrets.json"),
            key: dir.join(".callsign.key"),
        }
    }

    /// Defaults rooted at the state directory, each overridable by its own
    /// environment variable.
    pub fn from_env() -> Self {
        let defaults = Self::in_dir(resolve_state_dir());
        Self {
            global_state: env_path("CALLSIGN_GLOBAL_STATE_PATH").unwrap_or(defaults.global_state),
            workspace_state: env_path("CALLSIGN_WORKSPACE_STATE_PATH")
                .unwrap_or(defaults.workspace_state),
            secrets: env_path("CALLSIGN_SECRETS_PATH").unwrap_or(defaults.secrets),
            key: env_path("CALLSIGN_KEY_PATH").unwrap_or(defaults.key),
        }
    }
}
