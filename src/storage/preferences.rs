use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to access preferences file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse preferences: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Per-tag notification switches. Tags without an entry notify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationPreferences {
    by_tag: BTreeMap<String, bool>,
}

impl NotificationPreferences {
    pub fn is_enabled(&self, tag_id: &str) -> bool {
        self.by_tag.get(tag_id).copied().unwrap_or(true)
    }

    pub fn set(&mut self, tag_id: &str, enabled: bool) {
        self.by_tag.insert(tag_id.to_string(), enabled);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.by_tag.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        crate::storage::config::Config::config_dir().join("notification_prefs.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<NotificationPreferences, PreferencesError> {
        if !self.path.exists() {
            return Ok(NotificationPreferences::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, prefs: &NotificationPreferences) -> Result<(), PreferencesError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(prefs)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
