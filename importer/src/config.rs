//! Import configuration.
//!
//! An [`ImportConfiguration`] is immutable once built and is passed
//! explicitly to every step of a run. Building it is where all fail-fast
//! checks happen: entity type name, key field, line-break marker and the
//! field pattern compiled from the prefix.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};
use crate::mapping::FieldMap;
use crate::model::Entity;
use crate::parser::{FieldPattern, DEFAULT_LINE_BREAK};

static ENTITY_TYPE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]+(?:::[A-Za-z]+)*$").expect("valid entity type regex"));

/// Whether `name` is a valid entity type identifier (`Post`, `Blog::Post`).
pub fn is_valid_entity_type(name: &str) -> bool {
    ENTITY_TYPE_NAME.is_match(name)
}

// =============================================================================
// Policies
// =============================================================================

/// How a per-row problem is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Emit a diagnostic and keep going.
    #[default]
    Warn,
    /// Abort the run.
    Fatal,
}

/// Severity of unmapped fields and invalid entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailurePolicy {
    #[serde(default)]
    pub unmapped: Severity,
    #[serde(default)]
    pub invalid: Severity,
}

impl FailurePolicy {
    /// Everything is fatal.
    pub fn strict() -> Self {
        Self {
            unmapped: Severity::Fatal,
            invalid: Severity::Fatal,
        }
    }
}

/// Whether a validation failure gets a full diagnostic.
pub enum Verbosity<E> {
    Flag(bool),
    /// Report only entities the predicate accepts.
    Predicate(Arc<dyn Fn(&E) -> bool + Send + Sync>),
}

impl<E> Verbosity<E> {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Verbosity::Predicate(Arc::new(f))
    }

    pub fn should_report(&self, entity: &E) -> bool {
        match self {
            Verbosity::Flag(flag) => *flag,
            Verbosity::Predicate(f) => f(entity),
        }
    }
}

impl<E> Default for Verbosity<E> {
    fn default() -> Self {
        Verbosity::Flag(true)
    }
}

impl<E> Clone for Verbosity<E> {
    fn clone(&self) -> Self {
        match self {
            Verbosity::Flag(flag) => Verbosity::Flag(*flag),
            Verbosity::Predicate(f) => Verbosity::Predicate(Arc::clone(f)),
        }
    }
}

impl<E> fmt::Debug for Verbosity<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Verbosity::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Everything one import run needs to know.
#[derive(Debug, Clone)]
pub struct ImportConfiguration<E> {
    entity_type: String,
    key_field: String,
    field_map: FieldMap<E>,
    verbosity: Verbosity<E>,
    line_break: String,
    null_literal: Option<String>,
    policy: FailurePolicy,
    pattern: FieldPattern,
}

impl<E> ImportConfiguration<E> {
    pub fn builder(
        entity_type: impl Into<String>,
        key_field: impl Into<String>,
    ) -> ImportConfigurationBuilder<E> {
        ImportConfigurationBuilder {
            entity_type: entity_type.into(),
            key_field: key_field.into(),
            prefix: String::new(),
            field_map: FieldMap::new(),
            verbosity: Verbosity::default(),
            line_break: DEFAULT_LINE_BREAK.to_string(),
            null_literal: None,
            policy: FailurePolicy::default(),
        }
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn prefix(&self) -> &str {
        self.pattern.prefix()
    }

    pub fn field_map(&self) -> &FieldMap<E> {
        &self.field_map
    }

    pub fn verbosity(&self) -> &Verbosity<E> {
        &self.verbosity
    }

    pub fn line_break(&self) -> &str {
        &self.line_break
    }

    pub fn null_literal(&self) -> Option<&str> {
        self.null_literal.as_deref()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn pattern(&self) -> &FieldPattern {
        &self.pattern
    }

    /// Attribute value for a raw dump value before any transform.
    pub fn raw_value(&self, raw: &str) -> Value {
        match &self.null_literal {
            Some(null) if null == raw => Value::Null,
            _ => Value::String(raw.to_string()),
        }
    }
}

/// Builder for [`ImportConfiguration`].
pub struct ImportConfigurationBuilder<E> {
    entity_type: String,
    key_field: String,
    prefix: String,
    field_map: FieldMap<E>,
    verbosity: Verbosity<E>,
    line_break: String,
    null_literal: Option<String>,
    policy: FailurePolicy,
}

impl<E> ImportConfigurationBuilder<E> {
    /// Field-name prefix, a regular-expression fragment.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn field_map(mut self, field_map: FieldMap<E>) -> Self {
        self.field_map = field_map;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbosity = Verbosity::Flag(verbose);
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity<E>) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn line_break(mut self, marker: impl Into<String>) -> Self {
        self.line_break = marker.into();
        self
    }

    pub fn null_literal(mut self, literal: impl Into<String>) -> Self {
        self.null_literal = Some(literal.into());
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> ConfigResult<ImportConfiguration<E>> {
        if !is_valid_entity_type(&self.entity_type) {
            return Err(ConfigError::InvalidEntityType(self.entity_type));
        }
        if self.key_field.trim().is_empty() {
            return Err(ConfigError::EmptyKeyField);
        }
        if self.line_break.is_empty() {
            return Err(ConfigError::EmptyLineBreak);
        }
        let pattern = FieldPattern::new(&self.prefix)?;

        Ok(ImportConfiguration {
            entity_type: self.entity_type,
            key_field: self.key_field,
            field_map: self.field_map,
            verbosity: self.verbosity,
            line_break: self.line_break,
            null_literal: self.null_literal,
            policy: self.policy,
            pattern,
        })
    }
}

// =============================================================================
// Config file
// =============================================================================

fn default_verbose() -> bool {
    true
}

/// JSON form of a configuration, as read by the CLI.
///
/// ```json
/// {
///   "entity": "Blog::Post",
///   "key": "legacy_id",
///   "prefix": "COLUMN_",
///   "map": { "id": "legacy_id" },
///   "verbose": true,
///   "null_literal": "NULL",
///   "policy": { "unmapped": "warn", "invalid": "fatal" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfigFile {
    pub entity: String,
    pub key: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub map: Option<Value>,
    #[serde(default = "default_verbose")]
    pub verbose: bool,
    #[serde(default)]
    pub line_break: Option<String>,
    #[serde(default)]
    pub null_literal: Option<String>,
    #[serde(default)]
    pub policy: FailurePolicy,
}

impl ImportConfigFile {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Turn the file into a builder, so callers can still override parts.
    pub fn into_builder<E: Entity + 'static>(self) -> ConfigResult<ImportConfigurationBuilder<E>> {
        let field_map = match &self.map {
            Some(map) => FieldMap::from_json_value(map)?,
            None => FieldMap::new(),
        };

        let mut builder = ImportConfiguration::builder(self.entity, self.key)
            .prefix(self.prefix)
            .field_map(field_map)
            .verbose(self.verbose)
            .policy(self.policy);
        if let Some(marker) = self.line_break {
            builder = builder.line_break(marker);
        }
        if let Some(literal) = self.null_literal {
            builder = builder.null_literal(literal);
        }
        Ok(builder)
    }
}
