//! Collection configuration
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Per-call options on `add` override the policy fields.

use crate::error::ErrorKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// What `add` does when an incoming record's id is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnConflict {
    /// Deep-merge incoming fields into the stored record
    #[default]
    Merge,
    /// Make the stored record equal to the incoming one, keeping its id
    Replace,
    /// Keep the stored record untouched
    Skip,
}

impl FromStr for OnConflict {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(OnConflict::Merge),
            "replace" => Ok(OnConflict::Replace),
            "skip" => Ok(OnConflict::Skip),
            other => Err(ConfigError::InvalidConflictPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OnConflict::Merge => "merge",
            OnConflict::Replace => "replace",
            OnConflict::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// Collection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Name used in log output
    pub name: String,
    /// Field holding the primary key
    pub id_attribute: String,
    /// Default conflict policy for `add`
    pub on_conflict: OnConflict,
    /// Commit the stored record after a merge or replace
    pub commit_on_merge: bool,
    /// Emit `Change` events when flushing record writes
    pub emit_record_events: bool,
    /// Buffer of the event broadcast channel
    pub event_capacity: usize,
    /// Queries slower than this are logged on the `slow_query` target
    pub slow_query_threshold_ms: Option<u64>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            id_attribute: "id".to_string(),
            on_conflict: OnConflict::Merge,
            commit_on_merge: true,
            emit_record_events: true,
            event_capacity: 256,
            slow_query_threshold_ms: None,
        }
    }
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn id_attribute(mut self, attr: impl Into<String>) -> Self {
        self.id_attribute = attr.into();
        self
    }

    pub fn on_conflict(mut self, policy: OnConflict) -> Self {
        self.on_conflict = policy;
        self
    }

    pub fn commit_on_merge(mut self, commit: bool) -> Self {
        self.commit_on_merge = commit;
        self
    }

    pub fn emit_record_events(mut self, emit: bool) -> Self {
        self.emit_record_events = emit;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn slow_query_threshold_ms(mut self, threshold: u64) -> Self {
        self.slow_query_threshold_ms = Some(threshold);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_attribute.is_empty() {
            return Err(ConfigError::InvalidSetting("id_attribute cannot be empty".to_string()));
        }
        if self.id_attribute.split('.').any(str::is_empty) {
            return Err(ConfigError::InvalidSetting(format!(
                "id_attribute '{}' is not a valid path",
                self.id_attribute
            )));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::InvalidSetting("event_capacity cannot be 0".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: CollectionConfig = toml::from_str(content).context("Failed to parse collection config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid conflict policy '{0}', expected merge, replace or skip")]
    InvalidConflictPolicy(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidArgument
    }
}
