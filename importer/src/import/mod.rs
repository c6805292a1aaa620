//! Attribute mapper and reconciler.
//!
//! For every row the scanner completes:
//!
//! 1. a fresh entity is instantiated and populated field by field
//!    (explicit map entry, then same-named attribute, then warning);
//! 2. the entity is either handed to a caller-supplied consumer, or
//!    validated and reconciled against the repository: insert when no record
//!    matches the key field, otherwise merge its non-null attributes into the
//!    match.
//!
//! Rows are independent. A bad row is reported and skipped unless the
//! configured [`FailurePolicy`](crate::config::FailurePolicy) makes it fatal.
//!
//! # Example
//!
//! ```rust,ignore
//! use vdump::{import_file, Diagnostics, ImportConfiguration, JsonStore, SchemaModel};
//!
//! let model = SchemaModel::from_file("post.schema.json", Some("Blog::Post"))?;
//! let config = ImportConfiguration::builder("Blog::Post", "legacy_id")
//!     .prefix("COLUMN_")
//!     .build()?;
//! let mut store = JsonStore::open(model.clone(), "posts.json")?;
//! let report = import_file("posts.txt", &config, &model, &mut store, Diagnostics::stderr())?;
//! println!("{}", report.summary());
//! ```

use std::path::Path;

use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{ImportConfiguration, Severity};
use crate::diagnostics::{Diagnostics, LogEntry};
use crate::error::{ConfigError, EntityError, ImportError, ImportResult, ScanResult};
use crate::mapping::FieldMapping;
use crate::model::{Entity, EntityType, Repository};
use crate::parser::{read_dump, scan_str, DropReason, DroppedLine, RawRow, RowScanner};

/// What happened to one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Inserted,
    Updated,
    /// Failed validation, nothing persisted.
    Invalid,
    /// Handed to the consumer.
    Yielded,
}

/// Summary of an import run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub rows: usize,
    pub inserted: usize,
    pub updated: usize,
    pub invalid: usize,
    pub yielded: usize,
    /// Fields that could not be assigned, across all rows
    pub unmapped_fields: usize,
    pub dropped_lines: usize,
    /// Encoding the dump was decoded with, when read from a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub diagnostics: Vec<LogEntry>,
}

impl ImportReport {
    fn record(&mut self, outcome: RowOutcome) {
        self.rows += 1;
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Invalid => self.invalid += 1,
            RowOutcome::Yielded => self.yielded += 1,
        }
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        if self.yielded > 0 {
            return format!(
                "Processed {} rows: {} yielded, {} unmapped fields",
                self.rows, self.yielded, self.unmapped_fields
            );
        }
        format!(
            "Processed {} rows: {} inserted, {} updated, {} invalid, {} unmapped fields",
            self.rows, self.inserted, self.updated, self.invalid, self.unmapped_fields
        )
    }
}

// =============================================================================
// Importer
// =============================================================================

/// Maps rows onto entities of one type and decides what happens to them.
pub struct Importer<'a, T: EntityType> {
    config: &'a ImportConfiguration<T::Entity>,
    entity_type: &'a T,
    diagnostics: Diagnostics,
    report: ImportReport,
}

impl<'a, T> Importer<'a, T>
where
    T: EntityType,
{
    /// Fails when the configured entity type does not name `entity_type`.
    pub fn new(
        config: &'a ImportConfiguration<T::Entity>,
        entity_type: &'a T,
        diagnostics: Diagnostics,
    ) -> ImportResult<Self> {
        if config.entity_type() != entity_type.name() {
            return Err(ConfigError::EntityTypeMismatch {
                configured: config.entity_type().to_string(),
                model: entity_type.name().to_string(),
            }
            .into());
        }

        let mut importer = Self {
            config,
            entity_type,
            diagnostics,
            report: ImportReport::default(),
        };
        for field in config.field_map().unrecognized() {
            importer
                .diagnostics
                .warning(format!("Unrecognized mapping for field '{}', it will be skipped", field));
        }
        Ok(importer)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Build a populated entity from one row.
    pub fn populate(&mut self, row: &RawRow) -> ImportResult<T::Entity> {
        let mut entity = self.entity_type.instantiate();
        let config = self.config;

        for (name, raw) in row.fields() {
            match config.field_map().get(name) {
                Some(FieldMapping::Direct(attribute)) => {
                    let value = config.raw_value(raw);
                    self.assign(row, &mut entity, name, attribute, value)?;
                }
                Some(FieldMapping::Transformed { attribute, transform }) => {
                    let value = match config.raw_value(raw) {
                        Value::Null => Value::Null,
                        _ => transform.apply(raw),
                    };
                    self.assign(row, &mut entity, name, attribute, value)?;
                }
                Some(FieldMapping::WithContext(apply)) => {
                    if let Err(err) = apply(raw, &mut entity) {
                        self.unmapped(row, name, Some(err))?;
                    }
                }
                Some(FieldMapping::Unrecognized(shape)) => {
                    self.diagnostics.log(
                        LogEntry::warning(format!(
                            "Field '{}' skipped, unrecognized mapping {}",
                            name, shape
                        ))
                        .with_row(row.index),
                    );
                }
                None if entity.has_attribute(name) => {
                    let value = config.raw_value(raw);
                    self.assign(row, &mut entity, name, name, value)?;
                }
                None => self.unmapped(row, name, None)?,
            }
        }

        Ok(entity)
    }

    fn assign(
        &mut self,
        row: &RawRow,
        entity: &mut T::Entity,
        field: &str,
        attribute: &str,
        value: Value,
    ) -> ImportResult<()> {
        match entity.set_attribute(attribute, value) {
            Ok(()) => Ok(()),
            Err(err) => self.unmapped(row, field, Some(err)),
        }
    }

    fn unmapped(&mut self, row: &RawRow, field: &str, cause: Option<EntityError>) -> ImportResult<()> {
        if self.config.policy().unmapped == Severity::Fatal {
            return Err(ImportError::UnmappedField {
                row: row.index,
                field: field.to_string(),
            });
        }

        self.report.unmapped_fields += 1;
        let message = match cause {
            Some(err) => format!("Unmapped field '{}': {}", field, err),
            None => format!("Unmapped field '{}'", field),
        };
        self.diagnostics.log(LogEntry::warning(message).with_row(row.index));
        Ok(())
    }

    /// Validate the entity and insert or update it.
    pub fn reconcile<R>(&mut self, row: &RawRow, entity: T::Entity, repo: &mut R) -> ImportResult<RowOutcome>
    where
        R: Repository<Entity = T::Entity>,
    {
        if let Err(errors) = entity.validate() {
            if self.config.verbosity().should_report(&entity) {
                self.report_invalid(row, &entity, &errors);
            }
            if self.config.policy().invalid == Severity::Fatal {
                return Err(ImportError::InvalidEntity {
                    row: row.index,
                    entity_type: self.config.entity_type().to_string(),
                    errors,
                });
            }
            return Ok(RowOutcome::Invalid);
        }

        let key = self.config.key_field();
        let key_value = entity.attribute(key);

        match repo.find_by(key, &key_value)? {
            None => {
                repo.insert(entity)?;
                Ok(RowOutcome::Inserted)
            }
            Some(mut existing) => {
                let changes: Map<String, Value> = entity
                    .attributes()
                    .into_iter()
                    .filter(|(_, v)| !v.is_null())
                    .collect();
                repo.update(&mut existing, changes)?;
                Ok(RowOutcome::Updated)
            }
        }
    }

    fn report_invalid(&mut self, row: &RawRow, entity: &T::Entity, errors: &[String]) {
        self.diagnostics.log(
            LogEntry::error(format!(
                "Invalid {}: {}",
                self.config.entity_type(),
                errors.join(", ")
            ))
            .with_row(row.index),
        );
        for line in entity.dump().lines() {
            self.diagnostics.log(LogEntry::info(line).with_indent(1));
        }
    }

    fn report_dropped(&mut self, dropped: Vec<DroppedLine>) {
        for line in dropped {
            let reason = match line.reason {
                DropReason::BeforeFirstRow => "before the first row marker",
                DropReason::NoOpenField => "with no open field",
            };
            self.diagnostics.warning(format!(
                "Line {} dropped, {}: {}",
                line.line, reason, line.text
            ));
            self.report.dropped_lines += 1;
        }
    }

    fn drive<I, S>(mut self, mut scanner: RowScanner<I>, mut sink: S) -> ImportResult<ImportReport>
    where
        I: Iterator<Item = ScanResult<String>>,
        S: FnMut(&mut Self, &RawRow, T::Entity) -> ImportResult<RowOutcome>,
    {
        self.diagnostics.info(format!(
            "Importing {} rows keyed by '{}'",
            self.config.entity_type(),
            self.config.key_field()
        ));

        while let Some(row) = scanner.next() {
            let row = row?;
            let dropped = scanner.take_dropped();
            self.report_dropped(dropped);

            let entity = self.populate(&row)?;
            let outcome = sink(&mut self, &row, entity)?;
            self.report.record(outcome);
        }
        let dropped = scanner.take_dropped();
        self.report_dropped(dropped);

        let summary = self.report.summary();
        self.diagnostics.success(summary);

        let mut report = self.report;
        report.diagnostics = self.diagnostics.into_entries();
        Ok(report)
    }

    /// Reconcile every row into `repo`.
    pub fn run<I, R>(self, scanner: RowScanner<I>, repo: &mut R) -> ImportResult<ImportReport>
    where
        I: Iterator<Item = ScanResult<String>>,
        R: Repository<Entity = T::Entity>,
    {
        let key = self.config.key_field();
        if !self.entity_type.instantiate().has_attribute(key) {
            return Err(ConfigError::UnknownKeyField {
                entity_type: self.config.entity_type().to_string(),
                key_field: key.to_string(),
            }
            .into());
        }

        self.drive(scanner, |importer, row, entity| importer.reconcile(row, entity, repo))
    }

    /// Hand every populated entity to `consumer`; nothing is validated or
    /// persisted.
    pub fn run_with<I, F>(self, scanner: RowScanner<I>, mut consumer: F) -> ImportResult<ImportReport>
    where
        I: Iterator<Item = ScanResult<String>>,
        F: FnMut(T::Entity),
    {
        self.drive(scanner, |_, _, entity| {
            consumer(entity);
            Ok(RowOutcome::Yielded)
        })
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Import an in-memory dump into `repo`.
pub fn import_str<T, R>(
    content: &str,
    config: &ImportConfiguration<T::Entity>,
    entity_type: &T,
    repo: &mut R,
    diagnostics: Diagnostics,
) -> ImportResult<ImportReport>
where
    T: EntityType,
    R: Repository<Entity = T::Entity>,
{
    let importer = Importer::new(config, entity_type, diagnostics)?;
    let scanner = scan_str(content, config.pattern().clone(), config.line_break());
    importer.run(scanner, repo)
}

/// Import a dump file into `repo`.
///
/// This is the primary entry point. The file is read and closed before the
/// first row is processed.
pub fn import_file<T, R, P>(
    path: P,
    config: &ImportConfiguration<T::Entity>,
    entity_type: &T,
    repo: &mut R,
    diagnostics: Diagnostics,
) -> ImportResult<ImportReport>
where
    T: EntityType,
    R: Repository<Entity = T::Entity>,
    P: AsRef<Path>,
{
    let importer = Importer::new(config, entity_type, diagnostics)?;
    let dump = read_dump(path)?;
    let scanner = scan_str(&dump.content, config.pattern().clone(), config.line_break());
    let mut report = importer.run(scanner, repo)?;
    report.encoding = Some(dump.encoding);
    Ok(report)
}

/// Populate entities from a dump file and pass each one to `consumer`
/// instead of persisting it.
pub fn import_file_with<T, F, P>(
    path: P,
    config: &ImportConfiguration<T::Entity>,
    entity_type: &T,
    diagnostics: Diagnostics,
    consumer: F,
) -> ImportResult<ImportReport>
where
    T: EntityType,
    F: FnMut(T::Entity),
    P: AsRef<Path>,
{
    let importer = Importer::new(config, entity_type, diagnostics)?;
    let dump = read_dump(path)?;
    let scanner = scan_str(&dump.content, config.pattern().clone(), config.line_break());
    let mut report = importer.run_with(scanner, consumer)?;
    report.encoding = Some(dump.encoding);
    Ok(report)
}

static DEPRECATION_NOTICE: OnceCell<()> = OnceCell::new();

/// Legacy single-call form of [`import_file`].
#[deprecated(since = "0.1.0", note = "use `import_file`, which takes an explicit diagnostics sink")]
pub fn import_dump<T, R, P>(
    path: P,
    config: &ImportConfiguration<T::Entity>,
    entity_type: &T,
    repo: &mut R,
) -> ImportResult<ImportReport>
where
    T: EntityType,
    R: Repository<Entity = T::Entity>,
    P: AsRef<Path>,
{
    let mut diagnostics = Diagnostics::stderr();
    if DEPRECATION_NOTICE.set(()).is_ok() {
        diagnostics.warning("import_dump is deprecated, use import_file");
    }
    import_file(path, config, entity_type, repo, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailurePolicy, Verbosity};
    use crate::diagnostics::LogLevel;
    use crate::mapping::FieldMap;
    use crate::model::test_support::{validations, Post, PostType, RecordingRepo};
    use crate::model::{Document, SchemaModel};
    use crate::store::JsonStore;
    use serde_json::json;

    const DUMP: &str = "\
*************************** 1. row ***************************
      COLUMN_id: 1
   COLUMN_title: Foo
 COLUMN_publish: 1
*************************** 2. row ***************************
      COLUMN_id: 2
   COLUMN_title: Bar
COLUMN_abstract: line one
line two
 COLUMN_publish: 0
";

    fn post_map() -> FieldMap<Post> {
        FieldMap::new()
            .with("id", FieldMapping::direct("legacy_id"))
            .with("abstract", FieldMapping::direct("body"))
            .with("publish", FieldMapping::transformed("published", |v| json!(v == "1")))
    }

    fn config(map: FieldMap<Post>) -> ImportConfiguration<Post> {
        ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(map)
            .build()
            .unwrap()
    }

    fn run(content: &str, config: &ImportConfiguration<Post>, repo: &mut RecordingRepo) -> ImportReport {
        import_str(content, config, &PostType, repo, Diagnostics::silent()).unwrap()
    }

    #[test]
    fn test_inserts_new_records() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let report = run(DUMP, &config, &mut repo);

        assert_eq!(report.rows, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.unmapped_fields, 0);
        assert_eq!(repo.rows[0].legacy_id.as_deref(), Some("1"));
        assert_eq!(repo.rows[0].published, Some(true));
        assert_eq!(repo.rows[1].body.as_deref(), Some("line one<br/>line two"));
        assert_eq!(repo.rows[1].published, Some(false));
    }

    #[test]
    fn test_update_merges_only_non_null() {
        let existing = Post {
            legacy_id: Some("2".into()),
            title: Some("Old".into()),
            body: Some("Keep me".into()),
            published: Some(true),
        };
        let mut repo = RecordingRepo::with_rows(vec![existing]);
        let config = config(post_map());

        let dump = "*** 1. row ***\nCOLUMN_id: 2\nCOLUMN_title: New\n";
        let report = run(dump, &config, &mut repo);

        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);
        assert_eq!(repo.rows.len(), 1);
        assert_eq!(repo.rows[0].title.as_deref(), Some("New"));
        assert_eq!(repo.rows[0].body.as_deref(), Some("Keep me"));
        assert_eq!(repo.rows[0].published, Some(true));
    }

    #[test]
    fn test_explicit_map_beats_auto_mapping() {
        // "title" exists on Post, but the map sends it to "body"
        let map = FieldMap::new()
            .with("id", FieldMapping::direct("legacy_id"))
            .with("title", FieldMapping::direct("body"))
            .with("heading", FieldMapping::direct("title"));
        let config = config(map);
        let mut repo = RecordingRepo::default();

        let dump = "*** 1. row ***\nCOLUMN_id: 9\nCOLUMN_title: Mapped\nCOLUMN_heading: Shown\n";
        run(dump, &config, &mut repo);

        assert_eq!(repo.rows[0].body.as_deref(), Some("Mapped"));
        assert_eq!(repo.rows[0].title.as_deref(), Some("Shown"));
    }

    #[test]
    fn test_unmapped_field_warns_and_continues() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let dump = "*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: T\nCOLUMN_views: 12\n*** 2. row ***\nCOLUMN_id: 2\nCOLUMN_title: U\n";
        let report = run(dump, &config, &mut repo);

        assert_eq!(report.inserted, 2);
        assert_eq!(report.unmapped_fields, 1);
        let warning = report
            .diagnostics
            .iter()
            .find(|e| e.level == LogLevel::Warning)
            .unwrap();
        assert!(warning.message.contains("views"));
        assert_eq!(warning.row, Some(1));
    }

    #[test]
    fn test_mapped_to_missing_attribute_is_unmapped() {
        let map = FieldMap::new().with("id", FieldMapping::direct("uuid"));
        let config = config(map);
        let mut repo = RecordingRepo::default();
        let report = run("*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: T\n", &config, &mut repo);

        assert_eq!(report.unmapped_fields, 1);
        assert!(report.diagnostics.iter().any(|e| e.message.contains("uuid")));
    }

    #[test]
    fn test_unrecognized_mapping_warns() {
        let map: FieldMap<Post> = FieldMap::from_json_value(&json!({
            "id": "legacy_id",
            "title": ["not", "a", "mapping"]
        }))
        .unwrap();
        let config = config(map);
        let mut repo = RecordingRepo::default();
        let report = run("*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: T\n", &config, &mut repo);

        // entry skipped, title never set, row fails validation
        assert_eq!(report.invalid, 1);
        assert!(report
            .diagnostics
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.contains("unrecognized mapping")));
    }

    #[test]
    fn test_invalid_row_is_skipped_with_dump() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let dump = "*** 1. row ***\nCOLUMN_id: 1\n*** 2. row ***\nCOLUMN_id: 2\nCOLUMN_title: Ok\n";
        let report = run(dump, &config, &mut repo);

        assert_eq!(report.invalid, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(repo.inserts, 1);

        let error = report.diagnostics.iter().find(|e| e.level == LogLevel::Error).unwrap();
        assert!(error.message.contains("Post"));
        assert!(error.message.contains("title can't be blank"));
        assert!(report.diagnostics.iter().any(|e| e.indent == 1 && e.message.contains("legacy_id")));
    }

    #[test]
    fn test_quiet_and_predicate_verbosity() {
        let quiet = ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(post_map())
            .verbose(false)
            .build()
            .unwrap();
        let mut repo = RecordingRepo::default();
        let report = run("*** 1. row ***\nCOLUMN_id: 1\n", &quiet, &mut repo);
        assert_eq!(report.invalid, 1);
        assert_eq!(report.diagnostics.iter().filter(|e| e.level == LogLevel::Error).count(), 0);

        let picky = ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(post_map())
            .verbosity(Verbosity::predicate(|p: &Post| p.legacy_id.as_deref() == Some("2")))
            .build()
            .unwrap();
        let mut repo = RecordingRepo::default();
        let report = run("*** 1. row ***\nCOLUMN_id: 1\n*** 2. row ***\nCOLUMN_id: 2\n", &picky, &mut repo);
        let errors: Vec<_> = report.diagnostics.iter().filter(|e| e.level == LogLevel::Error).collect();
        assert_eq!(report.invalid, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, Some(2));
    }

    #[test]
    fn test_consumer_bypasses_validation_and_store() {
        let config = config(post_map());
        let importer = Importer::new(&config, &PostType, Diagnostics::silent()).unwrap();
        let scanner = scan_str(
            "*** 1. row ***\nCOLUMN_id: 1\n*** 2. row ***\nCOLUMN_id: 2\nCOLUMN_title: B\n",
            config.pattern().clone(),
            config.line_break(),
        );

        let before = validations();
        let mut seen = Vec::new();
        let report = importer.run_with(scanner, |post| seen.push(post)).unwrap();

        assert_eq!(validations(), before);
        assert_eq!(report.yielded, 2);
        assert_eq!(report.invalid, 0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].title, None);
        assert_eq!(seen[1].title.as_deref(), Some("B"));
    }

    #[test]
    fn test_consumer_sees_final_row_once() {
        let config = config(post_map());
        let importer = Importer::new(&config, &PostType, Diagnostics::silent()).unwrap();
        let scanner = scan_str("*** 1. row ***\nCOLUMN_title: Only\n", config.pattern().clone(), "<br/>");

        let mut count = 0;
        importer.run_with(scanner, |_| count += 1).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_persist_mode_touches_store_per_row() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        run(DUMP, &config, &mut repo);
        // one lookup and one insert per row
        assert_eq!(repo.calls(), 4);
    }

    #[test]
    fn test_with_context_mapping_sets_many() {
        let map = FieldMap::new()
            .with("id", FieldMapping::direct("legacy_id"))
            .with(
                "combined",
                FieldMapping::with_context(|raw: &str, post: &mut Post| {
                    let (title, body) = raw.split_once('|').unwrap_or((raw, ""));
                    post.set_attribute("title", json!(title))?;
                    if !body.is_empty() {
                        post.set_attribute("body", json!(body))?;
                    }
                    Ok(())
                }),
            )
            .with("skip", FieldMapping::with_context(|_: &str, _: &mut Post| Ok(())));
        let config = config(map);
        let mut repo = RecordingRepo::default();
        let report = run("*** 1. row ***\nCOLUMN_id: 5\nCOLUMN_combined: Head|Tail\nCOLUMN_skip: x\n", &config, &mut repo);

        assert_eq!(report.unmapped_fields, 0);
        assert_eq!(repo.rows[0].title.as_deref(), Some("Head"));
        assert_eq!(repo.rows[0].body.as_deref(), Some("Tail"));
    }

    #[test]
    fn test_strict_policy_aborts_on_unmapped() {
        let config = ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(post_map())
            .policy(FailurePolicy::strict())
            .build()
            .unwrap();
        let mut repo = RecordingRepo::default();
        let dump = "*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: T\n*** 2. row ***\nCOLUMN_id: 2\nCOLUMN_bogus: x\n";
        let err = import_str(dump, &config, &PostType, &mut repo, Diagnostics::silent()).unwrap_err();

        assert!(matches!(err, ImportError::UnmappedField { row: 2, ref field } if field == "bogus"));
        // the first row already committed
        assert_eq!(repo.inserts, 1);
    }

    #[test]
    fn test_strict_policy_aborts_on_invalid() {
        let config = ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(post_map())
            .policy(FailurePolicy { invalid: Severity::Fatal, ..FailurePolicy::default() })
            .build()
            .unwrap();
        let mut repo = RecordingRepo::default();
        let err = import_str("*** 1. row ***\nCOLUMN_id: 1\n", &config, &PostType, &mut repo, Diagnostics::silent())
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidEntity { row: 1, .. }));
    }

    #[test]
    fn test_entity_type_mismatch_fails_fast() {
        let config = ImportConfiguration::<Post>::builder("Comment", "legacy_id").build().unwrap();
        let result = Importer::new(&config, &PostType, Diagnostics::silent());
        assert!(matches!(
            result,
            Err(ImportError::Config(ConfigError::EntityTypeMismatch { .. }))
        ));
    }

    #[test]
    fn test_missing_key_attribute_fails_fast() {
        let config = ImportConfiguration::<Post>::builder("Post", "slug").build().unwrap();
        let mut repo = RecordingRepo::default();
        let result = import_str(DUMP, &config, &PostType, &mut repo, Diagnostics::silent());
        assert!(matches!(
            result,
            Err(ImportError::Config(ConfigError::UnknownKeyField { .. }))
        ));
        assert_eq!(repo.calls(), 0);
    }

    #[test]
    fn test_dropped_lines_are_reported() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let dump = "garbage\n*** 1. row ***\norphan\nCOLUMN_id: 1\nCOLUMN_title: T\n";
        let report = run(dump, &config, &mut repo);

        assert_eq!(report.dropped_lines, 2);
        assert_eq!(report.inserted, 1);
    }

    #[test]
    fn test_null_literal_skips_transform() {
        let config = ImportConfiguration::builder("Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(post_map())
            .null_literal("NULL")
            .build()
            .unwrap();
        let mut repo = RecordingRepo::default();
        run("*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: T\nCOLUMN_publish: NULL\nCOLUMN_abstract: NULL\n", &config, &mut repo);

        assert_eq!(repo.rows[0].published, None);
        assert_eq!(repo.rows[0].body, None);
    }

    #[test]
    fn test_import_file_reports_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.txt");
        std::fs::write(&path, DUMP).unwrap();

        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let report = import_file(&path, &config, &PostType, &mut repo, Diagnostics::silent()).unwrap();

        assert_eq!(report.encoding.as_deref(), Some("utf-8"));
        assert_eq!(report.inserted, 2);
    }

    #[test]
    fn test_import_file_with_consumer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.txt");
        std::fs::write(&path, DUMP).unwrap();

        let config = config(post_map());
        let mut titles = Vec::new();
        let report = import_file_with(&path, &config, &PostType, Diagnostics::silent(), |p: Post| {
            titles.push(p.title.unwrap_or_default())
        })
        .unwrap();

        assert_eq!(report.yielded, 2);
        assert_eq!(titles, vec!["Foo", "Bar"]);
    }

    #[test]
    fn test_missing_file_is_scan_error() {
        let config = config(post_map());
        let mut repo = RecordingRepo::default();
        let result = import_file("/nonexistent/dump.txt", &config, &PostType, &mut repo, Diagnostics::silent());
        assert!(matches!(result, Err(ImportError::Scan(_))));
    }

    #[test]
    #[allow(deprecated)]
    fn test_deprecated_entry_point_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.txt");
        std::fs::write(&path, DUMP).unwrap();
        let config = config(post_map());

        let mut repo = RecordingRepo::default();
        let first = import_dump(&path, &config, &PostType, &mut repo).unwrap();
        let mut repo = RecordingRepo::default();
        let second = import_dump(&path, &config, &PostType, &mut repo).unwrap();

        let notices = |r: &ImportReport| {
            r.diagnostics.iter().filter(|e| e.message.contains("deprecated")).count()
        };
        assert_eq!(notices(&first), 1);
        assert_eq!(notices(&second), 0);
        assert_eq!(second.inserted, 2);
    }

    // Bundled schema model and JSON store

    fn post_model() -> SchemaModel {
        SchemaModel::new(
            "Blog::Post",
            &json!({
                "type": "object",
                "required": ["title"],
                "properties": {
                    "legacy_id": { "type": "string" },
                    "title": { "type": "string", "minLength": 1 },
                    "body": { "type": "string" },
                    "published": { "type": "boolean" }
                }
            }),
        )
        .unwrap()
    }

    fn document_config() -> ImportConfiguration<Document> {
        let map = FieldMap::from_json_value(&json!({
            "id": "legacy_id",
            "publish": {"attribute": "published", "operations": [
                {"type": "nullify", "values": ["NULL"]},
                {"type": "to_boolean", "true_values": ["1"]}
            ]}
        }))
        .unwrap();
        ImportConfiguration::builder("Blog::Post", "legacy_id")
            .prefix("COLUMN_")
            .field_map(map)
            .build()
            .unwrap()
    }

    fn import_documents(dump: &str, model: &SchemaModel, store: &mut JsonStore) -> ImportReport {
        import_str(dump, &document_config(), model, store, Diagnostics::silent()).unwrap()
    }

    #[test]
    fn test_schema_store_insert_then_merge() {
        let model = post_model();
        let mut store = JsonStore::in_memory(model.clone());

        let first = "*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: Foo\nCOLUMN_body: Text\nCOLUMN_publish: 1\n";
        let report = import_documents(first, &model, &mut store);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.records()[0].attributes["published"], json!(true));

        // nulled publish flag and missing body must not overwrite stored values
        let second = "*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_title: Foo v2\nCOLUMN_publish: NULL\n";
        let report = import_documents(second, &model, &mut store);
        assert_eq!(report.updated, 1);
        assert_eq!(report.inserted, 0);

        assert_eq!(store.len(), 1);
        let record = &store.records()[0];
        assert_eq!(record.attributes["legacy_id"], "1");
        assert_eq!(record.attributes["title"], "Foo v2");
        assert_eq!(record.attributes["body"], "Text");
        assert_eq!(record.attributes["published"], json!(true));
    }

    #[test]
    fn test_schema_store_skips_invalid_row() {
        let model = post_model();
        let mut store = JsonStore::in_memory(model.clone());

        let dump = "*** 1. row ***\nCOLUMN_id: 1\nCOLUMN_body: no title\n*** 2. row ***\nCOLUMN_id: 2\nCOLUMN_title: Kept\n";
        let report = import_documents(dump, &model, &mut store);

        assert_eq!(report.invalid, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.records()[0].attributes["legacy_id"], "2");

        let error = report.diagnostics.iter().find(|e| e.level == LogLevel::Error).unwrap();
        assert_eq!(error.row, Some(1));
        assert!(error.message.starts_with("Invalid Blog::Post: "));
        assert!(error.message.contains("title"));
        assert!(report
            .diagnostics
            .iter()
            .any(|e| e.indent == 1 && e.message.starts_with("Blog::Post")));
    }

    #[test]
    fn test_schema_store_null_key_matches_keyless_record() {
        let model = post_model();
        let mut store = JsonStore::in_memory(model.clone());

        let dump = "*** 1. row ***\nCOLUMN_title: First\nCOLUMN_body: Stays\n*** 2. row ***\nCOLUMN_title: Second\n";
        let report = import_documents(dump, &model, &mut store);

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(store.len(), 1);
        let record = &store.records()[0];
        assert!(!record.attributes.contains_key("legacy_id"));
        assert_eq!(record.attributes["title"], "Second");
        assert_eq!(record.attributes["body"], "Stays");
    }

    #[test]
    fn test_schema_store_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("posts.txt");
        let store_path = dir.path().join("posts.json");
        std::fs::write(&dump_path, "*** 1. row ***\nCOLUMN_id: 7\nCOLUMN_title: Saved\nCOLUMN_publish: 0\n").unwrap();

        let model = post_model();
        let config = document_config();
        let mut store = JsonStore::open(model.clone(), &store_path).unwrap();
        let report = import_file(&dump_path, &config, &model, &mut store, Diagnostics::silent()).unwrap();
        assert_eq!(report.inserted, 1);

        let reopened = JsonStore::open(model.clone(), &store_path).unwrap();
        let found = reopened.find_by("legacy_id", &json!("7")).unwrap().unwrap();
        assert_eq!(found.attribute("title"), json!("Saved"));
        assert_eq!(found.attribute("published"), json!(false));
    }
}
