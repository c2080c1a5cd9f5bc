/*!
Save slot adapters for persisting encoded save data.

A save slot is one named cell per mod holding a single opaque string. This
module defines the slot abstraction (port) and its implementations (adapters);
the manager only ever reads or replaces the whole blob.
*/

pub mod file;

use std::sync::{Arc, Mutex};

use crate::{Result, SaveDataError};

pub use file::FileSlot;

/// Persistence primitive consumed by the save data manager
///
/// Implementations treat the slot as an atomic key-value cell, not a filesystem.
#[cfg_attr(test, mockall::automock)]
pub trait SaveSlot {
    /// Read the slot contents
    ///
    /// # Returns
    /// `Ok(None)` when nothing has been written yet
    fn read(&self) -> Result<Option<String>>;

    /// Replace the slot contents
    fn write(&self, text: &str) -> Result<()>;

    /// Check whether the slot holds data
    fn exists(&self) -> bool;

    /// Remove the slot contents; deleting an empty slot succeeds
    fn delete(&self) -> Result<()>;

    /// Human-readable location used in log lines
    fn describe(&self) -> String;
}

impl SaveSlot for Box<dyn SaveSlot> {
    fn read(&self) -> Result<Option<String>> {
        self.as_ref().read()
    }

    fn write(&self, text: &str) -> Result<()> {
        self.as_ref().write(text)
    }

    fn exists(&self) -> bool {
        self.as_ref().exists()
    }

    fn delete(&self) -> Result<()> {
        self.as_ref().delete()
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}

/// In-memory save slot
///
/// Clones share the same cell, so a clone handed to a second manager
/// simulates a process restart against the same save file.
#[derive(Debug, Clone, Default)]
pub struct MemorySlot {
    cell: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a slot that already holds `text`
    pub fn with_contents<S: Into<String>>(text: S) -> Self {
        Self {
            cell: Arc::new(Mutex::new(Some(text.into()))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>> {
        self.cell
            .lock()
            .map_err(|_| SaveDataError::slot("Memory slot lock poisoned"))
    }
}

impl SaveSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.lock()?.clone())
    }

    fn write(&self, text: &str) -> Result<()> {
        *self.lock()? = Some(text.to_string());
        Ok(())
    }

    fn exists(&self) -> bool {
        self.lock().map(|cell| cell.is_some()).unwrap_or(false)
    }

    fn delete(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_slot_basic_operations() {
        let slot = MemorySlot::new();
        assert!(!slot.exists());
        assert_eq!(slot.read().unwrap(), None);

        slot.write("saved").unwrap();
        assert!(slot.exists());
        assert_eq!(slot.read().unwrap().as_deref(), Some("saved"));

        slot.delete().unwrap();
        assert!(!slot.exists());
        assert!(slot.delete().is_ok());
    }

    #[test]
    fn test_memory_slot_clones_share_contents() {
        let slot = MemorySlot::new();
        let restarted = slot.clone();

        slot.write("first process").unwrap();
        assert_eq!(restarted.read().unwrap().as_deref(), Some("first process"));
    }

    #[test]
    fn test_boxed_slot_delegates() {
        let slot: Box<dyn SaveSlot> = Box::new(MemorySlot::with_contents("x"));
        assert!(slot.exists());
        assert_eq!(slot.read().unwrap().as_deref(), Some("x"));
        assert_eq!(slot.describe(), "memory");
    }

    #[test]
    fn test_mock_slot_failure() {
        let mut slot = MockSaveSlot::new();
        slot.expect_write()
            .returning(|_| Err(SaveDataError::slot("disk full")));

        let err = slot.write("data").unwrap_err();
        assert_eq!(err.to_string(), "Save slot error: disk full");
    }
}
