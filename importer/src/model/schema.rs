//! Schema-driven model: entities described by a JSON Schema document.
//!
//! The schema's `properties` are the settable attributes, and validation is
//! JSON Schema Draft 7 against the attributes that are set.
//!
//! ```json
//! {
//!   "title": "Blog::Post",
//!   "type": "object",
//!   "required": ["legacy_id", "title"],
//!   "properties": {
//!     "legacy_id": { "type": "string" },
//!     "title": { "type": "string", "minLength": 1 },
//!     "published": { "type": "boolean" }
//!   }
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::{ConfigError, ConfigResult, EntityError};
use crate::model::{Entity, EntityType};

struct SchemaInner {
    name: String,
    properties: Vec<String>,
    validator: jsonschema::Validator,
}

/// Model type backed by a JSON Schema.
#[derive(Clone)]
pub struct SchemaModel {
    inner: Arc<SchemaInner>,
}

impl SchemaModel {
    /// Compile a schema for the model called `name`.
    pub fn new(name: impl Into<String>, schema: &Value) -> ConfigResult<Self> {
        let properties: Vec<String> = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default();

        if properties.is_empty() {
            return Err(ConfigError::InvalidSchema(
                "schema declares no properties".to_string(),
            ));
        }

        let validator = jsonschema::draft7::new(schema)
            .map_err(|e| ConfigError::InvalidSchema(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(SchemaInner {
                name: name.into(),
                properties,
                validator,
            }),
        })
    }

    /// Load a schema file. Without an explicit name the schema `title` is used.
    pub fn from_file<P: AsRef<Path>>(path: P, name: Option<&str>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let schema: Value = serde_json::from_str(&content)?;

        let name = match name {
            Some(n) => n.to_string(),
            None => schema
                .get("title")
                .and_then(|t| t.as_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    ConfigError::InvalidSchema("schema has no title and no name was given".to_string())
                })?,
        };

        Self::new(name, &schema)
    }

    pub fn properties(&self) -> &[String] {
        &self.inner.properties
    }

    /// Rebuild a stored document.
    pub fn document(&self, id: Option<u64>, attributes: Map<String, Value>) -> Document {
        Document {
            model: self.clone(),
            id,
            attributes,
        }
    }
}

impl fmt::Debug for SchemaModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaModel")
            .field("name", &self.inner.name)
            .field("properties", &self.inner.properties)
            .finish()
    }
}

impl EntityType for SchemaModel {
    type Entity = Document;

    fn name(&self) -> &str {
        &self.inner.name
    }

    fn instantiate(&self) -> Document {
        self.document(None, Map::new())
    }
}

/// An instance of a [`SchemaModel`].
#[derive(Clone, Debug)]
pub struct Document {
    model: SchemaModel,
    id: Option<u64>,
    attributes: Map<String, Value>,
}

impl Document {
    /// Store id, once persisted.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Attributes that have been set to a non-null value.
    pub fn set_attributes(&self) -> Map<String, Value> {
        self.attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn merge(&mut self, changes: &Map<String, Value>) {
        for (name, value) in changes {
            self.attributes.insert(name.clone(), value.clone());
        }
    }
}

impl Entity for Document {
    fn has_attribute(&self, name: &str) -> bool {
        self.model.inner.properties.iter().any(|p| p == name)
    }

    fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), EntityError> {
        if !self.has_attribute(name) {
            return Err(EntityError::UnknownAttribute {
                entity_type: self.model.name().to_string(),
                attribute: name.to_string(),
            });
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn validate(&self) -> Result<(), Vec<String>> {
        let instance = Value::Object(self.set_attributes());
        let errors: Vec<String> = self
            .model
            .inner
            .validator
            .iter_errors(&instance)
            .map(|e| e.to_string())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn dump(&self) -> String {
        let state = json!({
            "id": self.id,
            "attributes": self.attributes(),
        });
        format!(
            "{} {}",
            self.model.name(),
            serde_json::to_string_pretty(&state).unwrap_or_default()
        )
    }

    fn attributes(&self) -> Map<String, Value> {
        self.model
            .inner
            .properties
            .iter()
            .map(|p| (p.clone(), self.attributes.get(p).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}
