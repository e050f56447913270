//! Bulk import from the remote table.
//!
//! Every remote row of a type is reconciled against local records with a
//! fixed precedence:
//!
//! 1. a local record whose external id is the row id
//! 2. a local record whose unique-identifier field equals the row's column
//! 3. a new local record
//!
//! Each row's local writes run in one savepoint, and nothing written here is
//! pushed back to the remote table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ResolvedType;
use crate::error::{Error, Result};
use crate::mapping::{map_import, resolve_unique_identifier, strip_primary_keys, unique_value};
use crate::model::Record;
use crate::remote::{FieldMap, RemoteError, RemoteRecord, TableKey};
use crate::storage::SqliteStorage;
use crate::sync::push::SyncEngine;
use crate::sync::types::{EntityStats, RowOutcome, SyncResult, TypeImport};
use crate::validate::{FieldErrors, RecordValidator, ValidatorSet};

/// Everything about a type that is resolved once before its rows run.
struct TypePlan {
    column: String,
    field: String,
    validator: Arc<dyn RecordValidator>,
    /// Parent for new tree resources; `None` means they cannot be created.
    container: Option<i64>,
}

/// Reconciles remote tables into local storage for one run.
///
/// Rows fetched for a table are cached for the rest of the run, so types
/// sharing a table fetch it once. A row claimed by one type is not offered
/// to the next.
pub struct BulkImporter<'a> {
    storage: &'a mut SqliteStorage,
    engine: &'a SyncEngine,
    validators: &'a ValidatorSet,
    cached_records: HashMap<TableKey, Arc<Vec<RemoteRecord>>>,
    records_used: HashSet<(TableKey, String)>,
}

impl<'a> BulkImporter<'a> {
    #[must_use]
    pub fn new(
        storage: &'a mut SqliteStorage,
        engine: &'a SyncEngine,
        validators: &'a ValidatorSet,
    ) -> Self {
        Self {
            storage,
            engine,
            validators,
            cached_records: HashMap::new(),
            records_used: HashSet::new(),
        }
    }

    /// Number of remote rows claimed so far in this run.
    #[must_use]
    pub fn records_used(&self) -> usize {
        self.records_used.len()
    }

    /// Reconcile every remote row of one type, creating local records for
    /// rows nothing matches.
    ///
    /// Configuration and fetch failures stop this type only; they are
    /// reported in [`TypeImport::error`]. Row failures are counted as
    /// skipped and never stop the run.
    pub fn import_type(&mut self, resolved: &ResolvedType) -> TypeImport {
        self.run_type(resolved, true)
    }

    /// Like [`import_type`](Self::import_type), but only claims rows that
    /// match an existing record of this type.
    ///
    /// Unmatched rows are neither counted nor claimed, so a later type on
    /// the same table can still create them.
    pub fn match_type(&mut self, resolved: &ResolvedType) -> TypeImport {
        self.run_type(resolved, false)
    }

    fn run_type(&mut self, resolved: &ResolvedType, may_create: bool) -> TypeImport {
        let mut report = TypeImport {
            entity_type: resolved.label.clone(),
            stats: EntityStats::default(),
            error: None,
            results: Vec::new(),
        };

        let plan = match self.plan(resolved) {
            Ok(plan) => plan,
            Err(e) => {
                error!(entity_type = %resolved.label, error = %e, "Skipping type");
                report.error = Some(e.to_string());
                return report;
            }
        };

        let rows = match self.get_or_set_cached_records(resolved) {
            Ok(rows) => rows,
            Err(e) => {
                let details = e.details();
                error!(
                    entity_type = %resolved.label,
                    status = details.status_code,
                    "Could not fetch remote records: {}",
                    details.message
                );
                report.error = Some(format!("Could not fetch remote records: {}", details.message));
                return report;
            }
        };

        let table = resolved.table_key();
        for row in rows.iter() {
            if self.records_used.contains(&(table.clone(), row.id.clone())) {
                continue;
            }
            debug!(entity_type = %resolved.label, record_id = %row.id, "Processing record");
            let result = self.process_record(resolved, &plan, row, may_create);
            if result.outcome == RowOutcome::NotCreated {
                continue;
            }
            if let Some(errors) = &result.errors {
                warn!(record_id = %row.id, "Failed to import: {errors}");
            }
            report.stats.record(result.outcome);
            report.results.push(result);
        }

        info!(
            entity_type = %resolved.label,
            created = report.stats.created,
            updated = report.stats.updated,
            skipped = report.stats.skipped,
            "Import finished"
        );
        report
    }

    /// Rows of the type's remote table, fetched at most once per run.
    ///
    /// # Errors
    ///
    /// Returns the remote error if the table cannot be reached or listed.
    pub fn get_or_set_cached_records(
        &mut self,
        resolved: &ResolvedType,
    ) -> std::result::Result<Arc<Vec<RemoteRecord>>, RemoteError> {
        let key = resolved.table_key();
        if let Some(rows) = self.cached_records.get(&key) {
            debug!(table = %key, "Using cached remote records");
            return Ok(Arc::clone(rows));
        }

        let client = self.engine.connector().connect(&resolved.config)?;
        let rows = Arc::new(client.list_all()?);
        info!(table = %key, rows = rows.len(), "Fetched remote records");
        self.cached_records.insert(key, Arc::clone(&rows));
        Ok(rows)
    }

    fn plan(&self, resolved: &ResolvedType) -> Result<TypePlan> {
        let config = &resolved.config;
        let Some((column, field)) = resolve_unique_identifier(config.unique_identifier.as_ref()) else {
            return Err(Error::Config(format!(
                "{} has no usable unique_identifier",
                resolved.label
            )));
        };
        let Some(validator) = self.validators.resolve(&config.validator) else {
            return Err(Error::Config(format!(
                "{} uses unknown validator '{}'",
                resolved.label, config.validator
            )));
        };

        let container = match (&config.parent_container, resolved.schema.tree) {
            (Some(container), true) => {
                let found = self.storage.resolve_container(container)?;
                if found.is_none() {
                    warn!(entity_type = %resolved.label, ?container, "Parent container not found");
                }
                found
            }
            _ => None,
        };

        Ok(TypePlan {
            column,
            field,
            validator,
            container,
        })
    }

    fn process_record(
        &mut self,
        resolved: &ResolvedType,
        plan: &TypePlan,
        row: &RemoteRecord,
        may_create: bool,
    ) -> SyncResult {
        let mapped = map_import(&row.fields, &resolved.config.import_mapping);
        let raw = row.fields.clone();

        let existing = match self.find_existing(resolved, plan, row) {
            Ok(existing) => existing,
            Err(e) => return SyncResult::failed(&row.id, raw, FieldErrors::exception(e.to_string())),
        };
        let matched = existing.is_some();

        let engine = self.engine;
        let outcome = self.storage.atomic(|storage| match existing {
            Some(record) => update_local(storage, engine, resolved, plan, record, &row.id, &mapped),
            None if may_create => create_local(storage, engine, resolved, plan, &row.id, &mapped),
            None => Ok((RowOutcome::NotCreated, None)),
        });

        let result = match outcome {
            Ok((outcome, local_id)) => {
                debug!(record_id = %row.id, outcome = ?outcome, "Processed record");
                SyncResult::new(&row.id, raw, outcome).with_local_id(local_id)
            }
            Err(Error::Validation(errors)) => SyncResult::failed(&row.id, raw, errors),
            Err(e) => SyncResult::failed(&row.id, raw, FieldErrors::exception(e.to_string())),
        };

        if matched || result.outcome != RowOutcome::NotCreated {
            self.records_used.insert((resolved.table_key(), row.id.clone()));
        }
        result
    }

    /// Local record for a row: by external id first, then by unique value.
    ///
    /// Extra records claiming the same external id lose it; the lowest
    /// local id keeps it.
    fn find_existing(
        &mut self,
        resolved: &ResolvedType,
        plan: &TypePlan,
        row: &RemoteRecord,
    ) -> Result<Option<Record>> {
        let mut by_id = self.storage.find_by_external_id(&resolved.label, &row.id)?;
        if by_id.len() > 1 {
            let losers: Vec<i64> = by_id[1..].iter().filter_map(|r| r.id).collect();
            warn!(
                entity_type = %resolved.label,
                record_id = %row.id,
                kept = ?by_id[0].id,
                cleared = ?losers,
                "Several local records claim one external id"
            );
            self.storage.clear_external_ids(&resolved.label, &losers)?;
            by_id.truncate(1);
        }
        if let Some(record) = by_id.pop() {
            debug!(local_id = ?record.id, "Found existing instance by id");
            return Ok(Some(record));
        }

        let Some(value) = unique_value(&row.fields, &plan.column) else {
            return Ok(None);
        };
        let found = self.storage.find_by_field(&resolved.label, &plan.field, &value)?;
        if let Some(record) = &found {
            debug!(local_id = ?record.id, "Found existing instance by unique identifier");
        }
        Ok(found)
    }
}

fn validate(
    storage: &mut SqliteStorage,
    resolved: &ResolvedType,
    plan: &TypePlan,
    mapped: &FieldMap,
) -> Result<FieldMap> {
    plan.validator
        .validate(&resolved.schema, mapped, storage)
        .map_err(Error::Validation)
}

fn update_local(
    storage: &mut SqliteStorage,
    engine: &SyncEngine,
    resolved: &ResolvedType,
    plan: &TypePlan,
    mut record: Record,
    remote_id: &str,
    mapped: &FieldMap,
) -> Result<(RowOutcome, Option<i64>)> {
    if record.is_locked() {
        debug!(record_id = %remote_id, "Instance is locked, not updating");
        return Ok((RowOutcome::Locked, record.id));
    }

    let cleaned = strip_primary_keys(validate(storage, resolved, plan, mapped)?);
    let before = record.content_hash();
    record.apply_fields(&resolved.schema, &cleaned);
    record.set_external_record_id(remote_id);
    if record.content_hash() == before {
        debug!(record_id = %remote_id, "Instance didn't change, skipping save");
        return Ok((RowOutcome::Unchanged, record.id));
    }

    if let Some(tree) = record.tree.as_mut() {
        tree.has_unpublished_changes = true;
    }
    record.sync.push_to_remote = false;
    engine.save(storage, &mut record)?;
    if record.tree.is_some() {
        storage.create_revision(&record)?;
    }
    Ok((RowOutcome::Updated, record.id))
}

fn create_local(
    storage: &mut SqliteStorage,
    engine: &SyncEngine,
    resolved: &ResolvedType,
    plan: &TypePlan,
    remote_id: &str,
    mapped: &FieldMap,
) -> Result<(RowOutcome, Option<i64>)> {
    if resolved.schema.tree && plan.container.is_none() {
        debug!(record_id = %remote_id, "No parent container, not creating");
        return Ok((RowOutcome::NoParent, None));
    }

    let payload = strip_primary_keys(validate(storage, resolved, plan, mapped)?);
    let mut record = Record::for_schema(&resolved.schema);
    record.apply_fields(&resolved.schema, &payload);
    record.set_external_record_id(remote_id);
    record.sync.push_to_remote = false;
    if let Some(tree) = record.tree.as_mut() {
        tree.parent_id = plan.container;
        tree.live = false;
        tree.has_unpublished_changes = true;
    }
    engine.save(storage, &mut record)?;

    if record.tree.is_some() {
        let revision = storage.create_revision(&record)?;
        if resolved.config.auto_publish_new {
            storage.publish_revision(revision)?;
        }
    }
    Ok((RowOutcome::Created, record.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParentContainer, Registry, Settings, SyncConfiguration, UniqueIdentifier};
    use crate::model::{FieldDef, FieldKind, TreePosition};
    use crate::remote::{MemoryConnector, MemoryTable};
    use crate::storage::events::get_events;
    use serde_json::json;

    fn post_config() -> SyncConfiguration {
        let mut cfg = SyncConfiguration {
            remote_base: "app1".into(),
            remote_table: "Posts".into(),
            unique_identifier: Some(UniqueIdentifier::Mapping(
                [("Slug".to_string(), "slug".to_string())].into(),
            )),
            ..SyncConfiguration::default()
        };
        cfg.import_mapping.insert("Title".into(), "title".into());
        cfg.import_mapping.insert("Slug".into(), "slug".into());
        cfg
    }

    struct Fixture {
        storage: SqliteStorage,
        engine: SyncEngine,
        validators: ValidatorSet,
        table: Arc<MemoryTable>,
    }

    impl Fixture {
        fn new(settings: &Settings) -> Self {
            let connector = Arc::new(MemoryConnector::new());
            let table = connector.table("app1", "Posts");
            let registry = Arc::new(Registry::from_settings(settings).unwrap());
            Self {
                storage: SqliteStorage::open_memory().unwrap(),
                engine: SyncEngine::new(registry, connector).unwrap(),
                validators: ValidatorSet::default(),
                table,
            }
        }

        fn posts() -> Self {
            let mut settings = Settings {
                enabled: true,
                ..Settings::default()
            };
            settings.types.insert("blog.Post".into(), post_config());
            Self::new(&settings)
        }

        fn import(&mut self, label: &str) -> TypeImport {
            let resolved = Arc::clone(self.engine.registry().get(label).unwrap());
            let mut importer = BulkImporter::new(&mut self.storage, &self.engine, &self.validators);
            importer.import_type(&resolved)
        }

        fn local(&mut self, title: &str, slug: &str, external_id: &str) -> i64 {
            let mut record = Record::new("blog.Post");
            record.values.insert("title".into(), json!(title));
            record.values.insert("slug".into(), json!(slug));
            record.set_external_record_id(external_id);
            self.storage.save_record(&mut record).unwrap();
            record.id.unwrap()
        }
    }

    fn row(id: &str, title: &str, slug: &str) -> RemoteRecord {
        RemoteRecord::new(
            id,
            json!({"Title": title, "Slug": slug, "Notes": "ignored"})
                .as_object()
                .cloned()
                .unwrap(),
        )
    }

    #[test]
    fn test_new_row_creates_local_record() {
        let mut fx = Fixture::posts();
        fx.table.insert_rows([row("rec1", "A", "a")]);

        let report = fx.import("blog.Post");
        assert_eq!(report.stats, EntityStats { created: 1, updated: 0, skipped: 0 });
        assert!(report.results[0].is_new);

        let records = fx.storage.find_by_external_id("blog.Post", "rec1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values["title"], "A");
        assert_eq!(records[0].values["slug"], "a");
        assert!(!records[0].values.contains_key("Notes"));

        let calls = fx.table.calls();
        assert_eq!((calls.create, calls.update, calls.search), (0, 0, 0));
    }

    #[test]
    fn test_second_import_writes_nothing() {
        let mut fx = Fixture::posts();
        fx.table.insert_rows([row("rec1", "A", "a")]);
        fx.local("B", "b", "");
        fx.table.insert_rows([row("rec2", "B", "b")]);

        let first = fx.import("blog.Post");
        assert_eq!((first.stats.created, first.stats.updated), (1, 1));

        let events_before: i64 = fx
            .storage
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))
            .unwrap();
        let second = fx.import("blog.Post");
        assert_eq!(second.stats, EntityStats { created: 0, updated: 0, skipped: 2 });
        assert!(second.results.iter().all(|r| r.outcome == RowOutcome::Unchanged));

        let events_after: i64 = fx
            .storage
            .conn()
            .query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))
            .unwrap();
        assert_eq!(events_before, events_after);
    }

    #[test]
    fn test_external_id_match_wins_over_unique_value() {
        let mut fx = Fixture::posts();
        let by_id = fx.local("Old", "x", "rec1");
        let by_slug = fx.local("Other", "a", "");
        fx.table.insert_rows([row("rec1", "New", "a")]);

        let report = fx.import("blog.Post");
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.results[0].local_id, Some(by_id));

        let updated = fx.storage.get_record(by_id).unwrap().unwrap();
        assert_eq!(updated.values["title"], "New");
        let untouched = fx.storage.get_record(by_slug).unwrap().unwrap();
        assert_eq!(untouched.values["title"], "Other");
        assert!(untouched.external_record_id().is_empty());
    }

    #[test]
    fn test_unique_value_match_assigns_external_id() {
        let mut fx = Fixture::posts();
        let id = fx.local("A", "a", "");
        fx.table.insert_rows([row("rec7", "A", "a")]);

        let report = fx.import("blog.Post");
        assert_eq!(report.stats.updated, 1);
        let record = fx.storage.get_record(id).unwrap().unwrap();
        assert_eq!(record.external_record_id(), "rec7");
        assert_eq!(fx.storage.count_records("blog.Post").unwrap(), 1);
    }

    #[test]
    fn test_invalid_row_is_skipped_without_writes() {
        let mut cfg = post_config();
        cfg.fields = vec![
            FieldDef::new("title", FieldKind::Text).required(),
            FieldDef::new("slug", FieldKind::Slug),
        ];
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);
        fx.table.insert_rows([
            RemoteRecord::new("rec1", json!({"Slug": "a"}).as_object().cloned().unwrap()),
            row("rec2", "B", "b"),
        ]);

        let report = fx.import("blog.Post");
        assert_eq!(report.stats, EntityStats { created: 1, updated: 0, skipped: 1 });
        let failed = &report.results[0];
        assert_eq!(failed.outcome, RowOutcome::Failed);
        assert_eq!(
            failed.errors.as_ref().unwrap().get("title").unwrap(),
            ["This field is required."]
        );
        assert_eq!(failed.raw_fields["Slug"], "a");
        assert!(fx.storage.find_by_external_id("blog.Post", "rec1").unwrap().is_empty());
    }

    #[test]
    fn test_validation_failure_rolls_back_related_objects() {
        let mut cfg = post_config();
        cfg.import_mapping.insert("Tags".into(), "tags".into());
        cfg.fields = vec![
            FieldDef::new("title", FieldKind::Text).required(),
            FieldDef::new("tags", FieldKind::Tags),
        ];
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);
        fx.table.insert_rows([RemoteRecord::new(
            "rec1",
            json!({"Tags": "news, tech"}).as_object().cloned().unwrap(),
        )]);

        let report = fx.import("blog.Post");
        assert_eq!(report.stats.skipped, 1);
        assert!(fx.storage.list_related("tag").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_external_ids_keep_lowest_local_id() {
        let mut fx = Fixture::posts();
        let keeper = fx.local("A", "a", "rec1");
        let loser = fx.local("A copy", "a-copy", "rec1");
        fx.table.insert_rows([row("rec1", "A", "a")]);

        let report = fx.import("blog.Post");
        assert_eq!(report.results[0].local_id, Some(keeper));
        let loser = fx.storage.get_record(loser).unwrap().unwrap();
        assert!(loser.external_record_id().is_empty());
        let events = get_events(fx.storage.conn(), "blog.Post", &loser.id.unwrap().to_string(), None).unwrap();
        assert_eq!(events[0].old_value.as_deref(), Some("rec1"));
    }

    #[test]
    fn test_fetch_failure_is_reported_per_type() {
        let mut fx = Fixture::posts();
        fx.table.fail_next(RemoteError::Http(
            "401 Client Error: Unauthorized for url: https://api.example/v0/app1/Posts \
             [Error: {'type': 'AUTHENTICATION_REQUIRED', 'message': 'Authentication required'}]"
                .into(),
        ));
        let report = fx.import("blog.Post");
        assert_eq!(
            report.error.as_deref(),
            Some("Could not fetch remote records: Authentication required")
        );
        assert_eq!(report.stats.total(), 0);
    }

    #[test]
    fn test_shared_table_is_fetched_once_and_rows_claimed_once() {
        let mut cfg = post_config();
        cfg.equivalent_types = vec!["blog.Story".into()];
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);
        fx.table.insert_rows([row("rec1", "A", "a"), row("rec2", "B", "b")]);

        let mut story = Record::new("blog.Story");
        story.values.insert("slug".into(), json!("b"));
        fx.storage.save_record(&mut story).unwrap();

        let story_type = Arc::clone(fx.engine.registry().get("blog.Story").unwrap());
        let post_type = Arc::clone(fx.engine.registry().get("blog.Post").unwrap());
        let mut importer = BulkImporter::new(&mut fx.storage, &fx.engine, &fx.validators);
        let stories = importer.match_type(&story_type);
        let posts = importer.import_type(&post_type);
        assert_eq!(importer.records_used(), 2);
        drop(importer);

        assert_eq!(stories.stats, EntityStats { created: 0, updated: 1, skipped: 0 });
        assert_eq!(stories.results.len(), 1);
        assert_eq!(posts.stats, EntityStats { created: 1, updated: 0, skipped: 0 });
        assert_eq!(posts.results[0].remote_record_id, "rec1");
        assert_eq!(fx.table.calls().list_all, 1);
    }

    #[test]
    fn test_equivalent_type_creates_when_imported_alone() {
        let mut cfg = post_config();
        cfg.equivalent_types = vec!["blog.Story".into()];
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);
        fx.table.insert_rows([row("rec1", "A", "a")]);

        let report = fx.import("blog.Story");
        assert_eq!(report.stats, EntityStats { created: 1, updated: 0, skipped: 0 });
        assert_eq!(fx.storage.count_records("blog.Story").unwrap(), 1);
        assert_eq!(fx.storage.count_records("blog.Post").unwrap(), 0);
    }

    #[test]
    fn test_update_does_not_store_primary_keys() {
        let mut cfg = post_config();
        cfg.import_mapping.insert("Id".into(), "id".into());
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);
        let id = fx.local("Old", "a", "rec1");
        fx.table.insert_rows([RemoteRecord::new(
            "rec1",
            json!({"Title": "New", "Slug": "a", "Id": 999}).as_object().cloned().unwrap(),
        )]);

        let report = fx.import("blog.Post");
        assert_eq!(report.results[0].outcome, RowOutcome::Updated);
        let record = fx.storage.get_record(id).unwrap().unwrap();
        assert_eq!(record.id, Some(id));
        assert_eq!(record.values["title"], "New");
        assert!(!record.values.contains_key("id"));
    }

    #[test]
    fn test_boolean_unique_column_matches_existing_record() {
        let mut cfg = post_config();
        cfg.import_mapping.insert("Featured".into(), "featured".into());
        cfg.unique_identifier = Some(UniqueIdentifier::Mapping(
            [("Featured".to_string(), "featured".to_string())].into(),
        ));
        let mut settings = Settings::default();
        settings.types.insert("blog.Post".into(), cfg);
        let mut fx = Fixture::new(&settings);

        let mut record = Record::new("blog.Post");
        record.values.insert("featured".into(), json!(true));
        fx.storage.save_record(&mut record).unwrap();
        fx.table.insert_rows([RemoteRecord::new(
            "rec1",
            json!({"Title": "A", "Featured": true}).as_object().cloned().unwrap(),
        )]);

        let report = fx.import("blog.Post");
        assert_eq!(report.results[0].outcome, RowOutcome::Updated);
        assert_eq!(report.results[0].local_id, record.id);
        assert_eq!(fx.storage.count_records("blog.Post").unwrap(), 1);
    }

    fn page_settings(container: Option<ParentContainer>, auto_publish: bool) -> Settings {
        let mut cfg = post_config();
        cfg.tree = true;
        cfg.parent_container = container;
        cfg.auto_publish_new = auto_publish;
        let mut settings = Settings::default();
        settings.types.insert("home.Page".into(), cfg);
        settings
    }

    fn home(fx: &mut Fixture) -> i64 {
        let mut root = Record::new("home.Home");
        root.values.insert("slug".into(), json!("home"));
        root.tree = Some(TreePosition {
            live: true,
            ..TreePosition::default()
        });
        fx.storage.save_record(&mut root).unwrap();
        root.id.unwrap()
    }

    #[test]
    fn test_tree_resource_without_parent_is_not_created() {
        let mut fx = Fixture::new(&page_settings(None, false));
        fx.table.insert_rows([row("rec1", "A", "a")]);
        let report = fx.import("home.Page");
        assert_eq!(report.results[0].outcome, RowOutcome::NoParent);
        assert_eq!(fx.storage.count_records("home.Page").unwrap(), 0);
    }

    #[test]
    fn test_tree_resource_created_under_container() {
        let mut fx = Fixture::new(&page_settings(Some(ParentContainer::Path("home".into())), false));
        let parent = home(&mut fx);
        fx.table.insert_rows([row("rec1", "A", "a")]);

        let report = fx.import("home.Page");
        let id = report.results[0].local_id.unwrap();
        let page = fx.storage.get_record(id).unwrap().unwrap();
        let tree = page.tree.unwrap();
        assert_eq!(tree.parent_id, Some(parent));
        assert!(!tree.live);
        assert!(tree.has_unpublished_changes);
        assert_eq!(fx.storage.list_revisions(id).unwrap().len(), 1);
    }

    #[test]
    fn test_tree_resource_auto_published() {
        let mut fx = Fixture::new(&page_settings(Some(ParentContainer::Path("home".into())), true));
        home(&mut fx);
        fx.table.insert_rows([row("rec1", "A", "a")]);

        let report = fx.import("home.Page");
        let page = fx.storage.get_record(report.results[0].local_id.unwrap()).unwrap().unwrap();
        assert!(page.tree.unwrap().live);
    }

    #[test]
    fn test_tree_resource_update_creates_revision() {
        let mut fx = Fixture::new(&page_settings(None, false));
        let mut page = Record::new("home.Page");
        page.values.insert("title".into(), json!("Old"));
        page.values.insert("slug".into(), json!("a"));
        page.tree = Some(TreePosition {
            live: true,
            ..TreePosition::default()
        });
        page.set_external_record_id("rec1");
        fx.storage.save_record(&mut page).unwrap();
        let id = page.id.unwrap();
        fx.table.insert_rows([row("rec1", "New", "a")]);

        let report = fx.import("home.Page");
        assert_eq!(report.results[0].outcome, RowOutcome::Updated);
        let stored = fx.storage.get_record(id).unwrap().unwrap();
        assert_eq!(stored.values["title"], "New");
        assert!(stored.tree.unwrap().has_unpublished_changes);
        assert_eq!(fx.storage.list_revisions(id).unwrap().len(), 1);

        let again = fx.import("home.Page");
        assert_eq!(again.results[0].outcome, RowOutcome::Unchanged);
        assert_eq!(fx.storage.list_revisions(id).unwrap().len(), 1);
    }

    #[test]
    fn test_locked_resource_is_never_updated() {
        let mut fx = Fixture::new(&page_settings(None, false));
        let mut page = Record::new("home.Page");
        page.values.insert("title".into(), json!("Old"));
        page.tree = Some(TreePosition {
            locked: true,
            live: true,
            ..TreePosition::default()
        });
        page.set_external_record_id("rec1");
        fx.storage.save_record(&mut page).unwrap();
        fx.table.insert_rows([row("rec1", "New", "a")]);

        let report = fx.import("home.Page");
        assert_eq!(report.results[0].outcome, RowOutcome::Locked);
        assert_eq!(report.stats.skipped, 1);
        let stored = fx.storage.get_record(page.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.values["title"], "Old");
        assert!(fx.storage.list_revisions(page.id.unwrap()).unwrap().is_empty());
    }

    #[test]
    fn test_imported_records_are_not_pushed() {
        let mut fx = Fixture::posts();
        fx.table.insert_rows([row("rec1", "A", "a")]);
        fx.local("B", "b", "");
        fx.table.insert_rows([row("rec2", "B2", "b")]);
        fx.table.reset_calls();

        fx.import("blog.Post");
        let calls = fx.table.calls();
        assert_eq!((calls.create, calls.update, calls.get, calls.search), (0, 0, 0, 0));

        let records = fx.storage.find_by_external_id("blog.Post", "rec1").unwrap();
        assert_eq!(records.len(), 1);
    }
}
