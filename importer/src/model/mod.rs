//! Collaborator contracts for the target model layer.
//!
//! The importer never knows what an entity is. It talks to three traits:
//!
//! - [`EntityType`] - names the model and creates blank instances
//! - [`Entity`] - attribute introspection, assignment, validation, dumps
//! - [`Repository`] - lookup by attribute, insert, partial update
//!
//! [`SchemaModel`] / [`Document`] implement the first two on top of a JSON
//! Schema, and [`crate::store::JsonStore`] implements the third.

pub mod schema;

use serde_json::{Map, Value};

use crate::error::{EntityError, StoreResult};

pub use schema::{Document, SchemaModel};

/// One record of the target model.
pub trait Entity {
    /// Whether `name` is a settable attribute of this entity's type.
    fn has_attribute(&self, name: &str) -> bool;

    /// Assign an attribute. Fails for attributes the type does not have.
    fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), EntityError>;

    /// Validity check with human-readable error messages.
    fn validate(&self) -> Result<(), Vec<String>>;

    /// Full textual state, for diagnostics.
    fn dump(&self) -> String;

    /// Every attribute by name; unset attributes are `null`.
    fn attributes(&self) -> Map<String, Value>;

    fn attribute(&self, name: &str) -> Value {
        self.attributes().remove(name).unwrap_or(Value::Null)
    }
}

/// A model type: its name and a way to create empty instances.
pub trait EntityType {
    type Entity: Entity;

    /// Type name, e.g. `Blog::Post`.
    fn name(&self) -> &str;

    fn instantiate(&self) -> Self::Entity;
}

/// Persistent storage for one model type.
pub trait Repository {
    type Entity: Entity;

    /// First stored entity whose `attribute` equals `value`.
    fn find_by(&self, attribute: &str, value: &Value) -> StoreResult<Option<Self::Entity>>;

    /// Persist a new entity.
    fn insert(&mut self, entity: Self::Entity) -> StoreResult<()>;

    /// Apply `changes` to an already stored entity.
    fn update(&mut self, existing: &mut Self::Entity, changes: Map<String, Value>) -> StoreResult<()>;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Hand-written model used by unit tests.

    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    thread_local! {
        /// Number of `Post::validate` calls on this test thread.
        pub static VALIDATIONS: Cell<usize> = Cell::new(0);
    }

    pub fn validations() -> usize {
        VALIDATIONS.with(|c| c.get())
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct Post {
        pub legacy_id: Option<String>,
        pub title: Option<String>,
        pub body: Option<String>,
        pub published: Option<bool>,
    }

    fn as_text(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }

    impl Entity for Post {
        fn has_attribute(&self, name: &str) -> bool {
            matches!(name, "legacy_id" | "title" | "body" | "published")
        }

        fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), EntityError> {
            match name {
                "legacy_id" => self.legacy_id = as_text(value),
                "title" => self.title = as_text(value),
                "body" => self.body = as_text(value),
                "published" => self.published = value.as_bool(),
                _ => {
                    return Err(EntityError::UnknownAttribute {
                        entity_type: "Post".to_string(),
                        attribute: name.to_string(),
                    })
                }
            }
            Ok(())
        }

        fn validate(&self) -> Result<(), Vec<String>> {
            VALIDATIONS.with(|c| c.set(c.get() + 1));
            match &self.title {
                Some(t) if !t.is_empty() => Ok(()),
                _ => Err(vec!["title can't be blank".to_string()]),
            }
        }

        fn dump(&self) -> String {
            format!("{:?}", self)
        }

        fn attributes(&self) -> Map<String, Value> {
            let value = json!({
                "legacy_id": self.legacy_id,
                "title": self.title,
                "body": self.body,
                "published": self.published,
            });
            match value {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        }
    }

    pub struct PostType;

    impl EntityType for PostType {
        type Entity = Post;

        fn name(&self) -> &str {
            "Post"
        }

        fn instantiate(&self) -> Post {
            Post::default()
        }
    }

    /// Records every call it receives.
    #[derive(Debug, Default)]
    pub struct RecordingRepo {
        pub rows: Vec<Post>,
        pub lookups: Cell<usize>,
        pub inserts: usize,
        pub updates: usize,
    }

    impl RecordingRepo {
        pub fn with_rows(rows: Vec<Post>) -> Self {
            Self { rows, ..Self::default() }
        }

        pub fn calls(&self) -> usize {
            self.lookups.get() + self.inserts + self.updates
        }
    }

    impl Repository for RecordingRepo {
        type Entity = Post;

        fn find_by(&self, attribute: &str, value: &Value) -> StoreResult<Option<Post>> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(self
                .rows
                .iter()
                .find(|p| &p.attribute(attribute) == value)
                .cloned())
        }

        fn insert(&mut self, entity: Post) -> StoreResult<()> {
            self.inserts += 1;
            self.rows.push(entity);
            Ok(())
        }

        fn update(&mut self, existing: &mut Post, changes: Map<String, Value>) -> StoreResult<()> {
            self.updates += 1;
            let key = existing.legacy_id.clone();
            for (name, value) in changes {
                existing.set_attribute(&name, value)?;
            }
            if let Some(row) = self.rows.iter_mut().find(|p| p.legacy_id == key) {
                *row = existing.clone();
            }
            Ok(())
        }
    }
}
