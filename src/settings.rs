use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::linker::{MatchPolicy, DEFAULT_GALLERY_CAPACITY};
use crate::sessions::DEFAULT_SESSION_TIMEOUT_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerSettings {
    pub sim_threshold: f64,
    pub merge_window_ms: i64,
    pub gallery_capacity: usize,
    pub session_timeout_ms: i64,
    /// Fixed embedding length; learned from the first accepted vector when unset.
    pub embedding_dim: Option<usize>,
    pub downstream_buffer: usize,
}

impl Default for LinkerSettings {
    fn default() -> Self {
        let policy = MatchPolicy::default();
        Self {
            sim_threshold: policy.sim_threshold,
            merge_window_ms: policy.merge_window_ms,
            gallery_capacity: DEFAULT_GALLERY_CAPACITY,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
            embedding_dim: None,
            downstream_buffer: 256,
        }
    }
}

impl LinkerSettings {
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            sim_threshold: self.sim_threshold,
            merge_window_ms: self.merge_window_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.sim_threshold) {
            bail!("sim_threshold {} is outside [-1, 1]", self.sim_threshold);
        }
        if self.merge_window_ms < 0 {
            bail!("merge_window_ms must not be negative");
        }
        if self.gallery_capacity == 0 {
            bail!("gallery_capacity must be greater than zero");
        }
        if self.session_timeout_ms < 0 {
            bail!("session_timeout_ms must not be negative");
        }
        if self.embedding_dim == Some(0) {
            bail!("embedding_dim must be greater than zero when set");
        }
        if self.downstream_buffer == 0 {
            bail!("downstream_buffer must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UserSettings {
    #[serde(default)]
    linker: LinkerSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let data: UserSettings = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
            data.linker
                .validate()
                .with_context(|| format!("Invalid settings in {}", path.display()))?;
            data
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn linker(&self) -> LinkerSettings {
        self.read().linker.clone()
    }

    pub fn update_linker(&self, settings: LinkerSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        guard.linker = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        data.linker.validate()?;
        *self.write() = data;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, UserSettings> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let settings = store.linker();
        assert_eq!(settings.sim_threshold, 0.48);
        assert_eq!(settings.merge_window_ms, 15_000);
        assert_eq!(settings.gallery_capacity, 5000);
        assert_eq!(settings.session_timeout_ms, 2000);
        assert_eq!(settings.embedding_dim, None);
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"linker":{"sim_threshold":0.6,"embedding_dim":512}}"#).unwrap();
        let settings = SettingsStore::new(path).unwrap().linker();
        assert_eq!(settings.sim_threshold, 0.6);
        assert_eq!(settings.embedding_dim, Some(512));
        assert_eq!(settings.merge_window_ms, 15_000);
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"linker":{"gallery_capacity":0}}"#).unwrap();
        assert!(SettingsStore::new(path).is_err());
    }

    #[test]
    fn update_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.linker();
        settings.session_timeout_ms = 5000;
        store.update_linker(settings.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.linker(), settings);
        reopened.reload().unwrap();
        assert_eq!(reopened.linker().session_timeout_ms, 5000);
    }

    #[test]
    fn update_rejects_out_of_range_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        let mut settings = store.linker();
        settings.sim_threshold = 1.5;
        assert!(store.update_linker(settings).is_err());
        assert_eq!(store.linker().sim_threshold, 0.48);
    }
}
