//! Error types for the vertical dump importer.
//!
//! - [`ScanError`] - reading and tokenizing the dump
//! - [`ConfigError`] - invalid import configuration (always fatal, raised up front)
//! - [`StoreError`] - failures reported by the record store
//! - [`ImportError`] - top-level error for a whole import run
//!
//! Conversion into [`ImportError`] is automatic via `From`, so `?` works
//! across module boundaries.

use std::path::PathBuf;

use thiserror::Error;

// =============================================================================
// Scanner Errors
// =============================================================================

/// Errors while reading or tokenizing a dump.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Failed to read the input.
    #[error("Failed to read dump: {0}")]
    Io(#[from] std::io::Error),

    /// The input bytes could not be decoded into text.
    #[error("Failed to decode dump as {encoding}")]
    Encoding { encoding: String },

    /// The field-line pattern built from the prefix does not compile.
    #[error("Invalid field pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors raised while building an import configuration.
///
/// These are the only errors that abort a run before any row is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Entity type identifier is not a letters-and-`::` type name.
    #[error("Invalid entity type '{0}': expected letters and '::' separators only")]
    InvalidEntityType(String),

    /// Key field is empty.
    #[error("Key field must not be empty")]
    EmptyKeyField,

    /// Line-break marker is empty.
    #[error("Line-break marker must not be empty")]
    EmptyLineBreak,

    /// Field pattern failed to compile.
    #[error(transparent)]
    Pattern(#[from] ScanError),

    /// Config or schema file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config or schema file is not valid JSON for its shape.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Schema document has no usable `properties`.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Configuration names a different entity type than the model given.
    #[error("Configuration is for '{configured}' but the model is '{model}'")]
    EntityTypeMismatch { configured: String, model: String },

    /// A `replace` operation in a field map carries a bad regex.
    #[error("Invalid replace pattern '{pattern}' for field '{field}': {source}")]
    InvalidReplacePattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Key field is not an attribute of the entity type.
    #[error("{entity_type} has no key attribute '{key_field}'")]
    UnknownKeyField {
        entity_type: String,
        key_field: String,
    },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store file IO error.
    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store file JSON error.
    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Update targeted a record that is not persisted.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// The entity rejected an attribute while changes were applied.
    #[error(transparent)]
    Entity(#[from] EntityError),
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Errors raised by an entity when an attribute is assigned.
#[derive(Debug, Error)]
pub enum EntityError {
    /// The entity type has no settable attribute with this name.
    #[error("Unknown attribute '{attribute}' on {entity_type}")]
    UnknownAttribute {
        entity_type: String,
        attribute: String,
    },
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level error of an import run.
///
/// Unmapped fields and invalid entities only surface here when the caller
/// escalated them through [`crate::config::FailurePolicy`].
#[derive(Debug, Error)]
pub enum ImportError {
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dump could not be read.
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Store failure while persisting a row.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A field could not be mapped and the policy made this fatal.
    #[error("Row {row}: unmapped field '{field}'")]
    UnmappedField { row: usize, field: String },

    /// An entity failed validation and the policy made this fatal.
    #[error("Row {row}: invalid {entity_type}: {errors:?}")]
    InvalidEntity {
        row: usize,
        entity_type: String,
        errors: Vec<String>,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for scanning operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for import runs.
pub type ImportResult<T> = Result<T, ImportError>;
