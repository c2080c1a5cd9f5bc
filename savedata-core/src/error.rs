/*!
Error types for the savedata core engine.
*/

use thiserror::Error;

use crate::value::Brand;

/// Result type used throughout the savedata core.
pub type Result<T> = std::result::Result<T, SaveDataError>;

/// Errors that can occur while copying, encoding, or managing save data.
#[derive(Error, Debug)]
pub enum SaveDataError {
    /// I/O errors during save slot operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A feature name was registered twice
    #[error("The save data manager is already managing save data for a feature of: {0}")]
    DuplicateFeature(String),

    /// An operation named a feature that is not registered
    #[error("The save data manager is not managing save data for a feature of: {0}")]
    UnknownFeature(String),

    /// Registration attempted before `initialize` was called
    #[error("The save data manager has not been initialized")]
    NotInitialized,

    /// Registration attempted after `teardown` was called
    #[error("The save data manager has been torn down; cannot register feature: {0}")]
    TornDown(String),

    /// A value has no registered codec
    #[error("Unsupported type \"{type_name}\" at \"{path}\"")]
    UnsupportedType { type_name: String, path: String },

    /// A serialized table carried a brand but lacked one of its required fields
    #[error("Failed to deserialize {brand} at \"{path}\": missing required field \"{field}\"")]
    MissingBrandField {
        brand: Brand,
        field: String,
        path: String,
    },

    /// A serialized table carried a brand whose payload has the wrong shape
    #[error("Failed to deserialize {brand} at \"{path}\": {reason}")]
    MalformedBrand {
        brand: Brand,
        path: String,
        reason: String,
    },

    /// A default-map factory name has no registered factory
    #[error("Unknown default-map factory \"{name}\" at \"{path}\"")]
    UnknownFactory { name: String, path: String },

    /// A class discriminator has no registered class codec
    #[error("Unknown class \"{name}\" at \"{path}\"")]
    UnknownClass { name: String, path: String },

    /// DESERIALIZE received a live container or object instead of serialized data
    #[error("Expected serialized data at \"{path}\" but found a live {type_name}")]
    UnexpectedLiveValue { type_name: String, path: String },

    /// A key that cannot be represented (e.g. a brand used as a map key)
    #[error("Invalid key at \"{path}\": {reason}")]
    InvalidKey { path: String, reason: String },

    /// Invalid text format at the codec boundary
    #[error("Invalid save data format: {0}")]
    InvalidFormat(String),

    /// Integrity check failures
    #[error("Integrity check failed: expected hash {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    /// Save slot errors
    #[error("Save slot error: {0}")]
    Slot(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Logging or metrics setup errors
    #[error("Observability error: {0}")]
    Observability(String),
}

impl SaveDataError {
    /// Create a new save slot error
    pub fn slot<S: Into<String>>(msg: S) -> Self {
        Self::Slot(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new observability error
    pub fn observability<S: Into<String>>(msg: S) -> Self {
        Self::Observability(msg.into())
    }

    /// Create a new invalid format error
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        Self::InvalidFormat(msg.into())
    }

    /// Create a new unsupported type error
    pub fn unsupported<T: Into<String>, P: Into<String>>(type_name: T, path: P) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
            path: path.into(),
        }
    }

    /// Create a new missing brand field error
    pub fn missing_field<F: Into<String>, P: Into<String>>(brand: Brand, field: F, path: P) -> Self {
        Self::MissingBrandField {
            brand,
            field: field.into(),
            path: path.into(),
        }
    }

    /// Create a new malformed brand error
    pub fn malformed<P: Into<String>, R: Into<String>>(brand: Brand, path: P, reason: R) -> Self {
        Self::MalformedBrand {
            brand,
            path: path.into(),
            reason: reason.into(),
        }
    }
}
