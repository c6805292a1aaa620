//! JSON record store
//!
//! Keeps the records of one [`SchemaModel`] in a single JSON file. Every
//! insert and update is written to disk immediately, so each imported row
//! commits on its own.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{StoreError, StoreResult};
use crate::model::{Document, EntityType, Repository, SchemaModel};

/// A persisted record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned identifier
    pub id: u64,
    /// Attribute values (only non-null values are kept)
    pub attributes: Map<String, Value>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Last update timestamp (RFC 3339)
    pub updated_at: String,
}

/// On-disk layout of a store file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    entity_type: String,
    records: Vec<StoredRecord>,
}

/// Repository of [`Document`]s persisted as JSON
pub struct JsonStore {
    model: SchemaModel,
    /// Backing file, `None` for an in-memory store
    path: Option<PathBuf>,
    records: Vec<StoredRecord>,
}

impl JsonStore {
    /// Open (or start) a store file for `model`.
    pub fn open(model: SchemaModel, path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let file: StoreFile = serde_json::from_str(&content)?;
            file.records
        } else {
            Vec::new()
        };

        Ok(Self {
            model,
            path: Some(path),
            records,
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(model: SchemaModel) -> Self {
        Self {
            model,
            path: None,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[StoredRecord] {
        &self.records
    }

    pub fn get(&self, id: u64) -> Option<&StoredRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn next_id(&self) -> u64 {
        self.records.iter().map(|r| r.id).max().unwrap_or(0) + 1
    }

    /// Write all records to the backing file, if any.
    fn flush(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = StoreFile {
            entity_type: self.model.name().to_string(),
            records: self.records.clone(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Repository for JsonStore {
    type Entity = Document;

    fn find_by(&self, attribute: &str, value: &Value) -> StoreResult<Option<Document>> {
        let found = self
            .records
            .iter()
            .find(|r| r.attributes.get(attribute).unwrap_or(&Value::Null) == value);

        Ok(found.map(|r| self.model.document(Some(r.id), r.attributes.clone())))
    }

    fn insert(&mut self, entity: Document) -> StoreResult<()> {
        let timestamp = now();
        let record = StoredRecord {
            id: self.next_id(),
            attributes: entity.set_attributes(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        self.records.push(record);
        self.flush()
    }

    fn update(&mut self, existing: &mut Document, changes: Map<String, Value>) -> StoreResult<()> {
        let id = existing
            .id()
            .ok_or_else(|| StoreError::NotFound("document was never stored".to_string()))?;
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("id {}", id)))?;

        for (name, value) in &changes {
            if value.is_null() {
                record.attributes.remove(name);
            } else {
                record.attributes.insert(name.clone(), value.clone());
            }
        }
        record.updated_at = now();
        existing.merge(&changes);

        self.flush()
    }
}
