//! Persisted settings surface.
//!
//! The log group name is operator-facing state that outlives a process:
//! it is read from an explicit store at startup and written back on every
//! change. The store is a trait so the storage format stays decoupled from
//! the settings object; the default implementation is a JSON document on
//! disk.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings persisted across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipperSettings {
    /// Name of the CloudWatch log group pipelines ship to.
    #[serde(default)]
    pub log_group_name: String,
}

/// Read-at-startup, write-on-change persistence for [`ShipperSettings`].
pub trait SettingsStore: Send + Sync {
    /// Loads persisted settings; `Ok(None)` when nothing was saved yet.
    fn load(&self) -> Result<Option<ShipperSettings>, ConfigError>;

    /// Persists the given settings.
    fn save(&self, settings: &ShipperSettings) -> Result<(), ConfigError>;
}

/// JSON-document store at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Option<ShipperSettings>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, settings: &ShipperSettings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(settings)?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

/// The live settings object bound to its store.
pub struct Settings {
    inner: ShipperSettings,
    store: Arc<dyn SettingsStore>,
}

impl Settings {
    /// Loads settings from the store, defaulting when nothing is saved yet.
    pub fn load(store: Arc<dyn SettingsStore>) -> Result<Self, ConfigError> {
        let inner = store.load()?.unwrap_or_default();
        Ok(Settings { inner, store })
    }

    #[must_use]
    pub fn log_group_name(&self) -> &str {
        &self.inner.log_group_name
    }

    /// Sets the log group name, validating and persisting immediately.
    ///
    /// A blank name is rejected at set-time and nothing is persisted.
    pub fn set_log_group_name(&mut self, name: &str) -> Result<(), ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::BlankField("log group name"));
        }
        self.inner.log_group_name = name.to_string();
        self.store.save(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> Arc<JsonFileStore> {
        Arc::new(JsonFileStore::new(dir.path().join("settings.json")))
    }

    #[test]
    fn test_load_defaults_when_nothing_saved() {
        let dir = tempfile::tempdir().unwrap();

        let settings = Settings::load(store_in(&dir)).unwrap();

        assert_eq!(settings.log_group_name(), "");
    }

    #[test]
    fn test_set_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut settings = Settings::load(Arc::clone(&store) as Arc<dyn SettingsStore>).unwrap();
        settings.set_log_group_name("ci-builds").unwrap();

        // A fresh load through the same path sees the change.
        let reloaded = Settings::load(store).unwrap();
        assert_eq!(reloaded.log_group_name(), "ci-builds");
    }

    #[test]
    fn test_blank_name_rejected_and_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut settings = Settings::load(Arc::clone(&store) as Arc<dyn SettingsStore>).unwrap();
        settings.set_log_group_name("ci-builds").unwrap();

        let err = settings.set_log_group_name("   ").unwrap_err();

        assert!(matches!(err, ConfigError::BlankField(_)));
        let reloaded = Settings::load(store).unwrap();
        assert_eq!(reloaded.log_group_name(), "ci-builds");
    }

    #[test]
    fn test_set_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::load(store_in(&dir)).unwrap();

        settings.set_log_group_name("  ci-builds  ").unwrap();

        assert_eq!(settings.log_group_name(), "ci-builds");
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));
        let settings = ShipperSettings {
            log_group_name: "ci-builds".to_string(),
        };

        store.save(&settings).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, Some(settings));
    }

    #[test]
    fn test_corrupt_document_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(path);

        assert!(store.load().is_err());
    }
}
