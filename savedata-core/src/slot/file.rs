/*!
Local filesystem save slot.
*/

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::SaveSlot;
use crate::{Result, SaveDataError};

/// Save slot backed by a single file
///
/// Parent directories are created on first write. Writes go to a sibling
/// `.tmp` file that is renamed over the slot, so a reader never sees a
/// partially written save.
///
/// # Example
/// ```rust
/// use savedata_core::slot::{FileSlot, SaveSlot};
///
/// let dir = tempfile::tempdir()?;
/// let slot = FileSlot::with_base_dir(dir.path(), "my-mod");
/// slot.write("{}")?;
/// assert_eq!(slot.read()?.as_deref(), Some("{}"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// File extension used by [`FileSlot::with_base_dir`]
    pub const EXTENSION: &'static str = "dat";

    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// One slot per mod: `<base_dir>/<mod_name>.dat`
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P, mod_name: &str) -> Self {
        Self::new(
            base_dir
                .as_ref()
                .join(format!("{mod_name}.{}", Self::EXTENSION)),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file that receives a write before it replaces the slot
    pub fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_staged(&self, staging: &Path, text: &str) -> std::io::Result<()> {
        let mut file = File::create(staging)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        fs::rename(staging, &self.path)
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SaveDataError::slot(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl SaveSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SaveDataError::slot(format!(
                "Failed to read save data from {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn write(&self, text: &str) -> Result<()> {
        self.ensure_parent_dir()?;

        let staging = self.staging_path();
        self.write_staged(&staging, text).map_err(|e| {
            let _ = fs::remove_file(&staging);
            SaveDataError::slot(format!(
                "Failed to write save data to {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn delete(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                SaveDataError::slot(format!(
                    "Failed to delete save data {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
