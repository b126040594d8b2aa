use std::{fs, path::Path};

use serde::Deserialize;

use crate::{FlowError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// autosave config
    pub autosave: AutosaveConfig,
    /// upload config
    pub upload: UploadConfig,
    /// default placement of new and duplicated nodes
    pub layout: LayoutConfig,
    /// edge creation rules
    pub edges: EdgeConfig,
    /// store config
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AutosaveConfig {
    /// quiet period in milliseconds before a save is issued, defaults to 1000
    pub debounce_ms: u64,
    /// longest time in milliseconds a pending change may wait while edits keep arriving, defaults to 5000
    pub max_delay_ms: u64,
    /// retries after a failed save, at least 1, defaults to 2
    pub retry_times: u64,
    /// interval between save retries in milliseconds, defaults to 500
    pub retry_interval_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            max_delay_ms: 5000,
            retry_times: 2,
            retry_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// retries after a failed upload before falling back, at least 1, defaults to 1
    pub retry_times: u64,
    /// interval between upload retries in milliseconds, defaults to 250
    pub retry_interval_ms: u64,
    /// folder hint used when the caller gives none
    pub default_folder: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_times: 1,
            retry_interval_ms: 250,
            default_folder: "uploads".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// horizontal offset applied to duplicated and cascaded nodes
    pub offset_x: f64,
    /// vertical offset applied to duplicated and cascaded nodes
    pub offset_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            offset_x: 40.0,
            offset_y: 40.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    /// what `connect` does with an identical existing edge
    pub duplicate_policy: DuplicateEdgePolicy,
}

/// Behavior of `connect` when the same (source, source handle, target, target handle) already exists.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateEdgePolicy {
    /// return the id of the existing edge and leave the document unchanged
    #[default]
    Reuse,
    /// fail with `DuplicateEdge`
    Reject,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// store type
    pub store_type: StoreType,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    #[default]
    Mem,
}

impl Config {
    pub fn create<T: AsRef<Path>>(path: T) -> Result<Self> {
        let data = fs::read_to_string(path.as_ref())
            .map_err(|e| FlowError::Config(format!("failed to load config file {:?}: {}", path.as_ref(), e)))?;

        Self::load_from_str(data.as_str())
    }

    pub fn load_from_str(toml_str: &str) -> Result<Self> {
        let config = toml::from_str::<Config>(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.autosave.retry_times == 0 {
            return Err(FlowError::Config("autosave.retry_times must be at least 1".into()));
        }
        if self.upload.retry_times == 0 {
            return Err(FlowError::Config("upload.retry_times must be at least 1".into()));
        }
        if self.autosave.max_delay_ms < self.autosave.debounce_ms {
            return Err(FlowError::Config("autosave.max_delay_ms must not be shorter than autosave.debounce_ms".into()));
        }
        Ok(())
    }
}
