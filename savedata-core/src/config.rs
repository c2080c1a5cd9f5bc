//! Configuration for the save data manager and its save slot
//!
//! This module provides configuration structures for selecting a save slot
//! backend and tuning lifecycle behavior, loadable from JSON.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::slot::{FileSlot, MemorySlot, SaveSlot};
use crate::{Result, SaveDataError};

/// Enumeration of supported save slot backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotBackend {
    /// In-memory slot, lost when the process exits
    Memory,
    /// One file on the local filesystem
    File,
}

/// Configuration structure for save slot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    /// The slot backend to use
    pub backend: SlotBackend,
    /// Path of the save file (required for the file backend)
    pub file_path: Option<PathBuf>,
}

impl SlotConfig {
    /// Create a configuration for an in-memory slot
    pub fn default_memory() -> Self {
        SlotConfig {
            backend: SlotBackend::Memory,
            file_path: None,
        }
    }

    /// Create a configuration for a file slot at `path`
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        SlotConfig {
            backend: SlotBackend::File,
            file_path: Some(path.into()),
        }
    }

    /// Parse a slot URI and create the matching configuration
    ///
    /// Supports formats:
    /// - `memory:` for an in-memory slot
    /// - `file:///abs/path/save.dat` for a file slot
    /// - `/local/path` or `./relative/path` for a file slot
    pub fn from_uri(uri: &str) -> Result<SlotConfig> {
        if uri == "memory:" || uri == "memory://" {
            return Ok(SlotConfig::default_memory());
        }

        let path = uri.strip_prefix("file://").unwrap_or(uri);
        if path.is_empty() {
            return Err(SaveDataError::validation("Invalid slot URI: missing file path"));
        }
        Ok(SlotConfig::file(path))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.backend {
            SlotBackend::File => match &self.file_path {
                Some(path) if !path.as_os_str().is_empty() => {}
                _ => {
                    return Err(SaveDataError::validation(
                        "File backend requires a file path",
                    ))
                }
            },
            SlotBackend::Memory => {}
        }
        Ok(())
    }

    /// Build the configured save slot
    pub fn build(&self) -> Result<Box<dyn SaveSlot>> {
        self.validate()?;
        match (&self.backend, &self.file_path) {
            (SlotBackend::File, Some(path)) => Ok(Box::new(FileSlot::new(path))),
            _ => Ok(Box::new(MemorySlot::new())),
        }
    }
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self::default_memory()
    }
}

/// When area-scoped state is cleared relative to the area start event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaClearTiming {
    /// Clear on [`Transition::AreaStart`](crate::Transition::AreaStart)
    Immediate,
    /// Clear on [`Transition::AreaStartDeferred`](crate::Transition::AreaStartDeferred),
    /// once area contents have settled
    Deferred,
}

/// Configuration for [`SaveDataManager`](crate::SaveDataManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub slot: SlotConfig,
    pub area_clear: AreaClearTiming,
    /// Save whenever a new sub-session starts
    pub autosave_on_sub_session: bool,
    /// Pretty-print the encoded save file
    pub pretty_json: bool,
    /// Emit a trace line for every value the copy engine visits
    pub trace_traversal: bool,
}

impl ManagerConfig {
    /// Parse a JSON configuration; absent fields take their defaults
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ManagerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.slot.validate()
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            slot: SlotConfig::default(),
            area_clear: AreaClearTiming::Immediate,
            autosave_on_sub_session: false,
            pretty_json: false,
            trace_traversal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_memory_config() {
        let config = SlotConfig::default_memory();
        assert_eq!(config.backend, SlotBackend::Memory);
        assert!(config.file_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_uri_memory() {
        let config = SlotConfig::from_uri("memory:").unwrap();
        assert_eq!(config.backend, SlotBackend::Memory);
    }

    #[test]
    fn test_from_uri_file_scheme() {
        let config = SlotConfig::from_uri("file:///var/saves/mod.dat").unwrap();
        assert_eq!(config.backend, SlotBackend::File);
        assert_eq!(config.file_path, Some(PathBuf::from("/var/saves/mod.dat")));
    }

    #[test]
    fn test_from_uri_plain_path() {
        let config = SlotConfig::from_uri("./saves/mod.dat").unwrap();
        assert_eq!(config.backend, SlotBackend::File);
        assert_eq!(config.file_path, Some(PathBuf::from("./saves/mod.dat")));
    }

    #[test]
    fn test_from_uri_invalid() {
        let result = SlotConfig::from_uri("file://");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("missing file path"));
    }

    #[test]
    fn test_validate_file_config() {
        let mut config = SlotConfig::file("save.dat");
        assert!(config.validate().is_ok());

        config.file_path = None;
        assert!(config.validate().is_err());

        config.file_path = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_manager_config_from_json() {
        let config = ManagerConfig::from_json(
            r#"{
                "slot": {"backend": "file", "file_path": "/tmp/x.dat"},
                "area_clear": "deferred",
                "autosave_on_sub_session": true
            }"#,
        )
        .unwrap();

        assert_eq!(config.slot.backend, SlotBackend::File);
        assert_eq!(config.area_clear, AreaClearTiming::Deferred);
        assert!(config.autosave_on_sub_session);
        assert!(!config.pretty_json);
    }

    #[test]
    fn test_manager_config_defaults_from_empty_json() {
        let config = ManagerConfig::from_json("{}").unwrap();
        assert_eq!(config, ManagerConfig::default());
    }

    #[test]
    fn test_manager_config_rejects_invalid_slot() {
        let result = ManagerConfig::from_json(r#"{"slot": {"backend": "file", "file_path": null}}"#);
        assert!(matches!(result, Err(SaveDataError::Validation(_))));
    }

    #[test]
    fn test_build_memory_slot() {
        let slot = SlotConfig::default_memory().build().unwrap();
        assert_eq!(slot.describe(), "memory");
    }
}
