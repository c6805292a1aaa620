//! Field map: how cleaned dump field names become entity attributes.
//!
//! Each configured entry is a [`FieldMapping`]. Fields without an entry fall
//! back to auto-mapping onto a same-named attribute (see [`crate::import`]).
//!
//! Maps are built either in Rust, with closures for transforms, or from a
//! JSON document whose transforms are chains of [`Operation`]s:
//!
//! ```json
//! {
//!   "id": "legacy_id",
//!   "publish": {"attribute": "published", "operations": [{"type": "to_boolean", "true_values": ["1"]}]},
//!   "name": {"targets": [
//!     {"attribute": "first_name", "operations": [{"type": "replace", "pattern": " .*$"}]},
//!     {"attribute": "last_name", "operations": [{"type": "replace", "pattern": "^.* "}]}
//!   ]}
//! }
//! ```

pub mod operations;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult, EntityError};
use crate::model::Entity;

pub use operations::{apply_all, describe_operations, Operation, Pattern};

/// Pure value transform: raw dump value in, attribute value out.
#[derive(Clone)]
pub enum Transform {
    Function(Arc<dyn Fn(&str) -> Value + Send + Sync>),
    Operations(Vec<Operation>),
}

impl Transform {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        Transform::Function(Arc::new(f))
    }

    pub fn apply(&self, raw: &str) -> Value {
        match self {
            Transform::Function(f) => f(raw),
            Transform::Operations(ops) => apply_all(ops, raw),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Function(_) => f.write_str("Transform::Function(..)"),
            Transform::Operations(ops) => f.debug_tuple("Transform::Operations").field(ops).finish(),
        }
    }
}

/// Callback that sets any number of attributes from one raw value.
pub type ContextFn<E> = Arc<dyn Fn(&str, &mut E) -> Result<(), EntityError> + Send + Sync>;

/// One configured field map entry.
pub enum FieldMapping<E> {
    /// Assign the raw value to this attribute as is.
    Direct(String),
    /// Assign the transformed raw value to this attribute.
    Transformed { attribute: String, transform: Transform },
    /// Let the callback decide what to set on the entity.
    WithContext(ContextFn<E>),
    /// Entry of an unknown shape, kept for the warning.
    Unrecognized(Value),
}

impl<E> FieldMapping<E> {
    pub fn direct(attribute: impl Into<String>) -> Self {
        FieldMapping::Direct(attribute.into())
    }

    pub fn transformed<F>(attribute: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        FieldMapping::Transformed {
            attribute: attribute.into(),
            transform: Transform::function(f),
        }
    }

    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(&str, &mut E) -> Result<(), EntityError> + Send + Sync + 'static,
    {
        FieldMapping::WithContext(Arc::new(f))
    }
}

impl<E> Clone for FieldMapping<E> {
    fn clone(&self) -> Self {
        match self {
            FieldMapping::Direct(a) => FieldMapping::Direct(a.clone()),
            FieldMapping::Transformed { attribute, transform } => FieldMapping::Transformed {
                attribute: attribute.clone(),
                transform: transform.clone(),
            },
            FieldMapping::WithContext(f) => FieldMapping::WithContext(Arc::clone(f)),
            FieldMapping::Unrecognized(v) => FieldMapping::Unrecognized(v.clone()),
        }
    }
}

impl<E> fmt::Debug for FieldMapping<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMapping::Direct(a) => f.debug_tuple("Direct").field(a).finish(),
            FieldMapping::Transformed { attribute, transform } => f
                .debug_struct("Transformed")
                .field("attribute", attribute)
                .field("transform", transform)
                .finish(),
            FieldMapping::WithContext(_) => f.write_str("WithContext(..)"),
            FieldMapping::Unrecognized(v) => f.debug_tuple("Unrecognized").field(v).finish(),
        }
    }
}

// =============================================================================
// JSON entry shapes
// =============================================================================

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TransformedSpec {
    attribute: String,
    #[serde(default)]
    operations: Vec<Operation>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FanOutSpec {
    targets: Vec<TransformedSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntrySpec {
    Direct(String),
    Transformed(TransformedSpec),
    FanOut(FanOutSpec),
}

impl<E: Entity + 'static> FieldMapping<E> {
    /// Interpret one JSON map entry. Shapes that fit no variant become
    /// [`FieldMapping::Unrecognized`] rather than an error.
    pub fn from_value(value: &Value) -> Self {
        match serde_json::from_value::<EntrySpec>(value.clone()) {
            Ok(EntrySpec::Direct(attribute)) => FieldMapping::Direct(attribute),
            Ok(EntrySpec::Transformed(spec)) => FieldMapping::Transformed {
                attribute: spec.attribute,
                transform: Transform::Operations(spec.operations),
            },
            Ok(EntrySpec::FanOut(spec)) => {
                let targets: Vec<(String, Vec<Operation>)> = spec
                    .targets
                    .into_iter()
                    .map(|t| (t.attribute, t.operations))
                    .collect();
                FieldMapping::with_context(move |raw, entity: &mut E| {
                    for (attribute, ops) in &targets {
                        entity.set_attribute(attribute, apply_all(ops, raw))?;
                    }
                    Ok(())
                })
            }
            Err(_) => FieldMapping::Unrecognized(value.clone()),
        }
    }
}

// =============================================================================
// Field map
// =============================================================================

/// Configured field map keyed by cleaned field name (prefix stripped).
pub struct FieldMap<E> {
    entries: HashMap<String, FieldMapping<E>>,
}

impl<E> FieldMap<E> {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Add an entry, builder style.
    pub fn with(mut self, field: impl Into<String>, mapping: FieldMapping<E>) -> Self {
        self.insert(field, mapping);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, mapping: FieldMapping<E>) {
        self.entries.insert(field.into(), mapping);
    }

    pub fn get(&self, field: &str) -> Option<&FieldMapping<E>> {
        self.entries.get(field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fields whose entries have an unknown shape.
    pub fn unrecognized(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self
            .entries
            .iter()
            .filter(|(_, m)| matches!(m, FieldMapping::Unrecognized(_)))
            .map(|(k, _)| k.as_str())
            .collect();
        fields.sort();
        fields
    }
}

impl<E: Entity + 'static> FieldMap<E> {
    /// Build a map from a JSON object of `field => entry`.
    ///
    /// A `replace` operation whose pattern does not compile fails the whole
    /// map; any other unknown shape becomes [`FieldMapping::Unrecognized`].
    pub fn from_json_value(value: &Value) -> ConfigResult<Self> {
        let object: Map<String, Value> = serde_json::from_value(value.clone())?;
        for (field, entry) in &object {
            if let Some((pattern, source)) = invalid_replace_pattern(entry) {
                return Err(ConfigError::InvalidReplacePattern {
                    field: field.clone(),
                    pattern,
                    source,
                });
            }
        }
        Ok(Self {
            entries: object
                .iter()
                .map(|(field, entry)| (field.clone(), FieldMapping::from_value(entry)))
                .collect(),
        })
    }
}

fn invalid_replace_pattern(entry: &Value) -> Option<(String, regex::Error)> {
    match entry {
        Value::Object(object) => {
            if object.get("type").and_then(Value::as_str) == Some("replace") {
                if let Some(pattern) = object.get("pattern").and_then(Value::as_str) {
                    if let Err(err) = regex::Regex::new(pattern) {
                        return Some((pattern.to_string(), err));
                    }
                }
            }
            object.values().find_map(invalid_replace_pattern)
        }
        Value::Array(items) => items.iter().find_map(invalid_replace_pattern),
        _ => None,
    }
}

impl<E> Default for FieldMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for FieldMap<E> {
    fn clone(&self) -> Self {
        Self { entries: self.entries.clone() }
    }
}

impl<E> fmt::Debug for FieldMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}
