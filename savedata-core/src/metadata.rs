/*!
Save envelope metadata and integrity verification.
*/

use crate::{Result, SaveDataError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current envelope format version for compatibility tracking
pub const SAVE_FORMAT_VERSION: u8 = 1;

/// Metadata written alongside every encoded save payload
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SaveMetadata {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// When the payload was encoded
    pub saved_at: DateTime<Utc>,

    /// SHA-256 hash of the canonical payload text
    pub content_hash: String,

    /// Number of top-level features in the payload
    pub feature_count: usize,

    /// Name of the text codec that produced the payload
    pub codec: String,

    /// Size of the canonical payload text in bytes
    #[serde(default)]
    pub payload_size: usize,
}

impl SaveMetadata {
    /// Create metadata for a payload produced by `codec`
    ///
    /// # Example
    /// ```rust
    /// use savedata_core::SaveMetadata;
    ///
    /// let metadata = SaveMetadata::new("json").with_content_hash(b"{}");
    /// assert_eq!(metadata.codec, "json");
    /// assert!(metadata.verify_integrity(b"{}").is_ok());
    /// ```
    pub fn new<S: Into<String>>(codec: S) -> Self {
        Self {
            format_version: SAVE_FORMAT_VERSION,
            saved_at: Utc::now(),
            content_hash: String::new(),
            feature_count: 0,
            codec: codec.into(),
            payload_size: 0,
        }
    }

    /// Set the content hash and payload size from the canonical payload
    pub fn with_content_hash(mut self, payload: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(payload);
        self.payload_size = payload.len();
        self
    }

    pub fn with_feature_count(mut self, feature_count: usize) -> Self {
        self.feature_count = feature_count;
        self
    }

    /// Compute SHA-256 hash of the provided data
    ///
    /// # Returns
    /// Hexadecimal string representation of the SHA-256 hash
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Verify the payload against the stored hash
    ///
    /// # Returns
    /// Ok(()) if the hash matches, Err(SaveDataError::IntegrityCheckFailed) otherwise
    pub fn verify_integrity(&self, payload: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(payload);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(SaveDataError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }

    /// Validate that all required fields are properly set
    pub fn validate(&self) -> Result<()> {
        if self.content_hash.is_empty() {
            return Err(SaveDataError::validation("content_hash cannot be empty"));
        }
        if self.codec.is_empty() {
            return Err(SaveDataError::validation("codec cannot be empty"));
        }
        if !self.is_compatible() {
            return Err(SaveDataError::validation(format!(
                "format version {} is newer than supported version {}",
                self.format_version, SAVE_FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Check if this metadata is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= SAVE_FORMAT_VERSION
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "v{} {} save with {} feature(s), {} bytes, saved {}",
            self.format_version,
            self.codec,
            self.feature_count,
            self.payload_size,
            self.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
