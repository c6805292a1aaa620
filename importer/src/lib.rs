//! # vdump - Vertical dump importer
//!
//! Imports vertical-format database dumps (blocks of `name: value` lines
//! separated by `*** N. row ***` markers) into a target model, inserting new
//! records and merging into existing ones by a key attribute.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Dump File  │────▶│   Scanner   │────▶│   Mapper    │────▶│ Reconciler  │
//! │  (ISO/UTF8) │     │ (row blocks)│     │ (field map) │     │ (store/cb)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use vdump::{import_file, Diagnostics, FieldMap, FieldMapping, ImportConfiguration, JsonStore, SchemaModel};
//! use serde_json::json;
//!
//! let model = SchemaModel::from_file("post.schema.json", Some("Blog::Post"))?;
//! let config = ImportConfiguration::builder("Blog::Post", "legacy_id")
//!     .prefix("COLUMN_")
//!     .field_map(
//!         FieldMap::new()
//!             .with("id", FieldMapping::direct("legacy_id"))
//!             .with("publish", FieldMapping::transformed("published", |v| json!(v == "1"))),
//!     )
//!     .build()?;
//! let mut store = JsonStore::open(model.clone(), "posts.json")?;
//! let report = import_file("posts.txt", &config, &model, &mut store, Diagnostics::stderr())?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`diagnostics`] - Operator-facing log entries
//! - [`parser`] - Row scanning and input decoding
//! - [`mapping`] - Field mappings and value operations
//! - [`config`] - Import configuration and policies
//! - [`model`] - Entity / repository contracts and the schema model
//! - [`store`] - JSON file repository
//! - [`import`] - Attribute mapper and reconciler

// Core modules
pub mod error;
pub mod diagnostics;

// Parsing
pub mod parser;

// Mapping
pub mod mapping;
pub mod config;

// Model layer
pub mod model;
pub mod store;

// Import
pub mod import;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ConfigResult,
    EntityError,
    ImportError,
    ImportResult,
    ScanError,
    ScanResult,
    StoreError,
    StoreResult,
};

// =============================================================================
// Re-exports - Diagnostics
// =============================================================================

pub use diagnostics::{Diagnostics, LogEntry, LogLevel};

// =============================================================================
// Re-exports - Scanning
// =============================================================================

pub use parser::{
    decode_content,
    detect_encoding,
    is_row_marker,
    normalize_value,
    read_dump,
    scan_reader,
    scan_str,
    DecodedDump,
    DropReason,
    DroppedLine,
    FieldPattern,
    RawRow,
    RowScanner,
    DEFAULT_LINE_BREAK,
};

// =============================================================================
// Re-exports - Mapping
// =============================================================================

pub use mapping::{FieldMap, FieldMapping, Transform};
pub use mapping::operations::{apply_all, describe_operations, Operation, Pattern};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{
    is_valid_entity_type,
    FailurePolicy,
    ImportConfigFile,
    ImportConfiguration,
    ImportConfigurationBuilder,
    Severity,
    Verbosity,
};

// =============================================================================
// Re-exports - Model & Store
// =============================================================================

pub use model::{Document, Entity, EntityType, Repository, SchemaModel};
pub use store::{JsonStore, StoredRecord};

// =============================================================================
// Re-exports - Import
// =============================================================================

#[allow(deprecated)]
pub use import::import_dump;
pub use import::{
    import_file,
    import_file_with,
    import_str,
    ImportReport,
    Importer,
    RowOutcome,
};
