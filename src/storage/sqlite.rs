//! SQLite storage implementation.
//!
//! Every write goes through [`SqliteStorage::mutate`], which runs the change
//! inside a savepoint and writes its audit events before releasing it.
//! Savepoints nest, so a whole reconciled row can be wrapped in
//! [`SqliteStorage::atomic`] while the individual writes inside it still use
//! `mutate`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::warn;

use crate::config::ParentContainer;
use crate::error::{Error, Result};
use crate::model::{Record, TreePosition};
use crate::remote::FieldMap;
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use crate::sync::{LocalStore, SyncState};
use crate::validate::RelatedObjects;

const RECORD_COLUMNS: &str = "id, entity_type, external_record_id, fields, is_tree, parent_id, \
                              locked, live, has_unpublished_changes, created_at, updated_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
    actor: String,
    depth: usize,
}

/// Context for a mutation, collecting audit events.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation.
    pub actor: String,
    /// Events to write before the savepoint is released.
    pub events: Vec<Event>,
}

impl MutationContext {
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: i64, event_type: EventType) {
        self.events.push(
            Event::new(entity_type, &entity_id.to_string(), event_type, &self.actor)
                .with_comment(&self.op_name),
        );
    }

    /// Record an event with old/new values.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: i64,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, &entity_id.to_string(), event_type, &self.actor)
                .with_values(old_value, new_value)
                .with_comment(&self.op_name),
        );
    }
}

/// A stored snapshot of a tree resource.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    pub id: i64,
    pub record_id: i64,
    pub content: serde_json::Value,
    pub actor: String,
    pub created_at: i64,
    pub published_at: Option<i64>,
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        apply_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    /// Open an in-memory database (for testing and dry runs).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            actor: "system".to_string(),
            depth: 0,
        }
    }

    /// Set the actor recorded on audit events.
    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a savepoint; roll everything back if it fails.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a database error from the savepoint itself.
    pub fn atomic<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Self) -> Result<R>,
    {
        self.depth += 1;
        let name = format!("tsync_sp_{}", self.depth);
        if let Err(e) = self.conn.execute_batch(&format!("SAVEPOINT {name}")) {
            self.depth -= 1;
            return Err(e.into());
        }

        let outcome = match f(self) {
            Ok(value) => self
                .conn
                .execute_batch(&format!("RELEASE {name}"))
                .map(|()| value)
                .map_err(Error::from),
            Err(e) => {
                if let Err(rollback) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    warn!(savepoint = %name, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        };

        self.depth -= 1;
        outcome
    }

    /// Execute a mutation and write its audit events atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The savepoint is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Connection, &mut MutationContext) -> Result<R>,
    {
        let mut ctx = MutationContext::new(op, &self.actor);
        self.atomic(|storage| {
            let result = f(&storage.conn, &mut ctx)?;
            for event in &ctx.events {
                insert_event(&storage.conn, event)?;
            }
            Ok(result)
        })
    }

    // ==================
    // Record Operations
    // ==================

    /// Insert or update a record, including its relation labels.
    ///
    /// Assigns `id` and timestamps on first save.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if an existing id no longer exists.
    pub fn save_record(&mut self, record: &mut Record) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let fields = serde_json::to_string(&record.values)?;
        let tree = record.tree.clone().unwrap_or_default();
        let is_tree = record.tree.is_some();

        let id = self.mutate("save_record", |conn, ctx| {
            let id = match record.id {
                None => {
                    conn.execute(
                        "INSERT INTO records (entity_type, external_record_id, fields, is_tree, parent_id,
                                              locked, live, has_unpublished_changes, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                        rusqlite::params![
                            record.entity_type,
                            record.sync.external_record_id,
                            fields,
                            is_tree,
                            tree.parent_id,
                            tree.locked,
                            tree.live || !is_tree,
                            tree.has_unpublished_changes,
                            now,
                        ],
                    )?;
                    let id = conn.last_insert_rowid();
                    ctx.record_event(&record.entity_type, id, EventType::RecordCreated);
                    if !record.sync.external_record_id.is_empty() {
                        ctx.record_change(
                            &record.entity_type,
                            id,
                            EventType::ExternalIdChanged,
                            None,
                            Some(record.sync.external_record_id.clone()),
                        );
                    }
                    id
                }
                Some(id) => {
                    let previous: Option<String> = conn
                        .query_row(
                            "SELECT external_record_id FROM records WHERE id = ?1",
                            [id],
                            |row| row.get(0),
                        )
                        .optional()?;
                    let Some(previous) = previous else {
                        return Err(Error::RecordNotFound {
                            entity_type: record.entity_type.clone(),
                            id,
                        });
                    };

                    conn.execute(
                        "UPDATE records SET external_record_id = ?2, fields = ?3, is_tree = ?4,
                                parent_id = ?5, locked = ?6, live = ?7, has_unpublished_changes = ?8,
                                updated_at = ?9
                         WHERE id = ?1",
                        rusqlite::params![
                            id,
                            record.sync.external_record_id,
                            fields,
                            is_tree,
                            tree.parent_id,
                            tree.locked,
                            tree.live || !is_tree,
                            tree.has_unpublished_changes,
                            now,
                        ],
                    )?;
                    ctx.record_event(&record.entity_type, id, EventType::RecordUpdated);
                    if previous != record.sync.external_record_id {
                        ctx.record_change(
                            &record.entity_type,
                            id,
                            EventType::ExternalIdChanged,
                            Some(previous),
                            Some(record.sync.external_record_id.clone()),
                        );
                    }
                    id
                }
            };

            conn.execute("DELETE FROM record_relations WHERE record_id = ?1", [id])?;
            for (field, labels) in &record.relations {
                for label in labels {
                    conn.execute(
                        "INSERT INTO record_relations (record_id, field, label) VALUES (?1, ?2, ?3)",
                        rusqlite::params![id, field, label],
                    )?;
                }
            }

            Ok(id)
        })?;

        if record.id.is_none() {
            record.created_at = now;
        }
        record.id = Some(id);
        record.updated_at = now;
        Ok(())
    }

    /// Get a record by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                [id],
                record_from_row,
            )
            .optional()?;

        match record {
            Some(mut record) => {
                self.load_relations(&mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// All records of one type, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_records(&self, entity_type: &str) -> Result<Vec<Record>> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM records WHERE entity_type = ?1 ORDER BY id"),
            rusqlite::params![entity_type],
        )
    }

    /// Records of one type claiming `external_id`, lowest id first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_external_id(&self, entity_type: &str, external_id: &str) -> Result<Vec<Record>> {
        if external_id.is_empty() {
            return Ok(Vec::new());
        }
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM records
                 WHERE entity_type = ?1 AND external_record_id = ?2 ORDER BY id"
            ),
            rusqlite::params![entity_type, external_id],
        )
    }

    /// First record of one type whose `field` renders as `value`.
    ///
    /// `id`/`pk` match the primary key. Booleans render as `true`/`false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_field(&self, entity_type: &str, field: &str, value: &str) -> Result<Option<Record>> {
        if field == "id" || field == "pk" {
            let Ok(id) = value.parse::<i64>() else {
                return Ok(None);
            };
            return Ok(self
                .get_record(id)?
                .filter(|r| r.entity_type == entity_type));
        }

        // json_extract yields 1/0 for booleans; compare them as JSON text.
        let path = json_path(field);
        let mut found = self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM records
                 WHERE entity_type = ?1
                   AND CASE json_type(fields, ?2)
                         WHEN 'true' THEN 'true'
                         WHEN 'false' THEN 'false'
                         ELSE CAST(json_extract(fields, ?2) AS TEXT)
                       END = ?3
                 ORDER BY id LIMIT 1"
            ),
            rusqlite::params![entity_type, path, value],
        )?;
        Ok(found.pop())
    }

    fn query_records(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut records = stmt
            .query_map(params, record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for record in &mut records {
            self.load_relations(record)?;
        }
        Ok(records)
    }

    fn load_relations(&self, record: &mut Record) -> Result<()> {
        let Some(id) = record.id else {
            return Ok(());
        };
        let mut stmt = self.conn.prepare(
            "SELECT field, label FROM record_relations WHERE record_id = ?1 ORDER BY field, label",
        )?;
        let rows = stmt.query_map([id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut relations: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for row in rows {
            let (field, label) = row?;
            relations.entry(field).or_default().insert(label);
        }
        record.relations = relations;
        Ok(())
    }

    /// Set the external id of the given records to empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn clear_external_ids(&mut self, entity_type: &str, ids: &[i64]) -> Result<usize> {
        self.mutate("clear_external_ids", |conn, ctx| {
            let mut cleared = 0;
            for &id in ids {
                let previous: Option<String> = conn
                    .query_row(
                        "SELECT external_record_id FROM records WHERE id = ?1 AND entity_type = ?2",
                        rusqlite::params![id, entity_type],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(previous) = previous else { continue };

                conn.execute(
                    "UPDATE records SET external_record_id = '' WHERE id = ?1",
                    [id],
                )?;
                ctx.record_change(entity_type, id, EventType::ExternalIdChanged, Some(previous), None);
                cleared += 1;
            }
            Ok(cleared)
        })
    }

    /// Clear the external id of every record of the given types.
    ///
    /// Returns the number of records of those types.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn reset_external_ids(&mut self, entity_types: &[String]) -> Result<usize> {
        self.mutate("reset_external_ids", |conn, _ctx| {
            let mut total = 0;
            for entity_type in entity_types {
                total += conn.execute(
                    "UPDATE records SET external_record_id = '' WHERE entity_type = ?1",
                    [entity_type],
                )?;
            }
            Ok(total)
        })
    }

    /// Delete a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] if no record of that type has that id.
    pub fn delete_record(&mut self, entity_type: &str, id: i64) -> Result<()> {
        self.mutate("delete_record", |conn, ctx| {
            let deleted = conn.execute(
                "DELETE FROM records WHERE id = ?1 AND entity_type = ?2",
                rusqlite::params![id, entity_type],
            )?;
            if deleted == 0 {
                return Err(Error::RecordNotFound {
                    entity_type: entity_type.to_string(),
                    id,
                });
            }
            ctx.record_event(entity_type, id, EventType::RecordDeleted);
            Ok(())
        })
    }

    /// Number of records of one type.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_records(&self, entity_type: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity_type = ?1",
            [entity_type],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Number of records of one type that carry an external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_synced(&self, entity_type: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE entity_type = ?1 AND external_record_id != ''",
            [entity_type],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    // ==================
    // Related Objects
    // ==================

    /// Id of the related object `kind`/`label`, inserting it if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or lookup fails.
    pub fn get_or_create_related(&mut self, kind: &str, label: &str) -> Result<i64> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM related_objects WHERE kind = ?1 AND label = ?2",
                rusqlite::params![kind, label],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("create_related", |conn, ctx| {
            conn.execute(
                "INSERT INTO related_objects (kind, label, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![kind, label, now],
            )?;
            let id = conn.last_insert_rowid();
            ctx.record_event(kind, id, EventType::RelatedCreated);
            Ok(id)
        })
    }

    /// Labels of every related object of one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_related(&self, kind: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT label FROM related_objects WHERE kind = ?1 ORDER BY label")?;
        let labels = stmt
            .query_map([kind], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(labels)
    }

    // ==================
    // Tree Resources
    // ==================

    /// Store a snapshot of a saved tree resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is unsaved or the insert fails.
    pub fn create_revision(&mut self, record: &Record) -> Result<i64> {
        let Some(record_id) = record.id else {
            return Err(Error::InvalidArgument(
                "cannot create a revision of an unsaved record".to_string(),
            ));
        };
        let content = serde_json::to_string(&record.to_json())?;
        let now = chrono::Utc::now().timestamp_millis();
        let actor = self.actor.clone();

        self.mutate("create_revision", |conn, ctx| {
            conn.execute(
                "INSERT INTO revisions (record_id, content, actor, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![record_id, content, actor, now],
            )?;
            let id = conn.last_insert_rowid();
            ctx.record_event(&record.entity_type, record_id, EventType::RevisionCreated);
            Ok(id)
        })
    }

    /// Publish a revision: the record goes live with no pending changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision does not exist or the update fails.
    pub fn publish_revision(&mut self, revision_id: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.mutate("publish_revision", |conn, ctx| {
            let target: Option<(i64, String)> = conn
                .query_row(
                    "SELECT r.record_id, rec.entity_type FROM revisions r
                     JOIN records rec ON rec.id = r.record_id WHERE r.id = ?1",
                    [revision_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((record_id, entity_type)) = target else {
                return Err(Error::InvalidArgument(format!("revision {revision_id} not found")));
            };

            conn.execute(
                "UPDATE revisions SET published_at = ?2 WHERE id = ?1",
                rusqlite::params![revision_id, now],
            )?;
            conn.execute(
                "UPDATE records SET live = 1, has_unpublished_changes = 0, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![record_id, now],
            )?;
            ctx.record_event(&entity_type, record_id, EventType::RevisionPublished);
            Ok(())
        })
    }

    /// Revisions of a record, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_revisions(&self, record_id: i64) -> Result<Vec<Revision>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, record_id, content, actor, created_at, published_at
             FROM revisions WHERE record_id = ?1 ORDER BY id DESC",
        )?;
        let revisions = stmt
            .query_map([record_id], |row| {
                let content: String = row.get(2)?;
                Ok(Revision {
                    id: row.get(0)?,
                    record_id: row.get(1)?,
                    content: parse_json_column(2, &content)?,
                    actor: row.get(3)?,
                    created_at: row.get(4)?,
                    published_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(revisions)
    }

    /// Resolve a configured parent container to a local tree record id.
    ///
    /// A path walks slugs from a root (`home/news`). Returns `None` when
    /// nothing matches.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn resolve_container(&self, container: &ParentContainer) -> Result<Option<i64>> {
        match container {
            ParentContainer::Id(id) => {
                let found: Option<i64> = self
                    .conn
                    .query_row(
                        "SELECT id FROM records WHERE id = ?1 AND is_tree = 1",
                        [id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(found)
            }
            ParentContainer::Path(path) => {
                let mut parent: Option<i64> = None;
                for slug in path.split('/').filter(|s| !s.is_empty()) {
                    let next: Option<i64> = self
                        .conn
                        .query_row(
                            "SELECT id FROM records
                             WHERE is_tree = 1 AND parent_id IS ?1
                               AND json_extract(fields, '$.slug') = ?2
                             ORDER BY id LIMIT 1",
                            rusqlite::params![parent, slug],
                            |row| row.get(0),
                        )
                        .optional()?;
                    match next {
                        Some(id) => parent = Some(id),
                        None => return Ok(None),
                    }
                }
                Ok(parent)
            }
        }
    }
}

impl LocalStore<Record> for SqliteStorage {
    fn persist(&mut self, record: &mut Record) -> Result<()> {
        self.save_record(record)
    }

    fn remove(&mut self, record: &Record) -> Result<()> {
        match record.id {
            Some(id) => self.delete_record(&record.entity_type, id),
            None => Ok(()),
        }
    }
}

impl RelatedObjects for SqliteStorage {
    fn get_or_create(&mut self, kind: &str, label: &str) -> Result<i64> {
        self.get_or_create_related(kind, label)
    }
}

/// `$."field"` so names with dots or spaces address one key.
fn json_path(field: &str) -> String {
    format!("$.\"{}\"", field.replace('"', "\\\""))
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    index: usize,
    text: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let fields: String = row.get(3)?;
    let is_tree: bool = row.get(4)?;
    let tree = is_tree
        .then(|| -> rusqlite::Result<TreePosition> {
            Ok(TreePosition {
                parent_id: row.get(5)?,
                locked: row.get(6)?,
                live: row.get(7)?,
                has_unpublished_changes: row.get(8)?,
            })
        })
        .transpose()?;

    Ok(Record {
        id: Some(row.get(0)?),
        entity_type: row.get(1)?,
        values: parse_json_column::<FieldMap>(3, &fields)?,
        relations: BTreeMap::new(),
        tree,
        sync: SyncState::new(row.get(2)?),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
