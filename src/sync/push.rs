//! Push-on-write state machine.
//!
//! A local write goes to the store first, then (when the entity's type is
//! enabled) to the remote table. Remote failures are classified and kept on
//! the entity; they never undo the local write.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{Registry, SyncConfiguration};
use crate::error::{Error, Result};
use crate::mapping::resolve_unique_identifier;
use crate::remote::{value_to_search_text, FieldMap, RemoteConnector, RemoteError, RemoteTableClient};
use crate::sync::state::{SyncPhase, SyncState};
use crate::sync::types::{PushAction, PushError, PushOutcome};

/// A local record type that participates in sync.
///
/// Implementors hold a [`SyncState`] and expose field values by name; the
/// engine does the rest.
pub trait Syncable {
    /// `app.Model` identifier used to find the configuration.
    fn type_label(&self) -> &str;

    fn sync_state(&self) -> &SyncState;

    fn sync_state_mut(&mut self) -> &mut SyncState;

    /// Current value of a local field, or `None` if it has none.
    fn field_value(&self, field: &str) -> Option<Value>;

    /// Remote column map to push.
    fn export_fields(&self, config: &SyncConfiguration) -> FieldMap;
}

/// Local persistence for syncable entities.
pub trait LocalStore<T> {
    /// Insert or update `entity`, assigning its local key if new.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn persist(&mut self, entity: &mut T) -> Result<()>;

    /// Delete `entity` locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn remove(&mut self, entity: &T) -> Result<()>;
}

/// Drives pushes for every syncable entity.
///
/// The remote connector is injected; the engine never decides on its own
/// whether to talk to a real service.
#[derive(Clone)]
pub struct SyncEngine {
    registry: Arc<Registry>,
    connector: Arc<dyn RemoteConnector>,
}

impl SyncEngine {
    /// Build an engine over a resolved registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a configured type has no usable unique
    /// identifier.
    pub fn new(registry: Arc<Registry>, connector: Arc<dyn RemoteConnector>) -> Result<Self> {
        for resolved in registry.canonical_types() {
            if resolve_unique_identifier(resolved.config.unique_identifier.as_ref()).is_none() {
                return Err(Error::Config(format!(
                    "{} has no usable unique_identifier (expected a column name or a single {{column: field}} entry)",
                    resolved.label
                )));
            }
        }
        Ok(Self {
            registry,
            connector,
        })
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn connector(&self) -> &Arc<dyn RemoteConnector> {
        &self.connector
    }

    /// Bind the entity to its configuration and remote table.
    ///
    /// Runs once per instance; later calls return the phase reached the
    /// first time.
    pub fn setup<E: Syncable + ?Sized>(&self, entity: &mut E) -> SyncPhase {
        if entity.sync_state().phase() != SyncPhase::Uninitialized {
            return entity.sync_state().phase();
        }

        let label = entity.type_label().to_string();
        let Some(resolved) = self.registry.get(&label) else {
            warn!(entity_type = %label, "Remote sync is not configured for this type");
            entity.sync_state_mut().disable();
            return SyncPhase::Disabled;
        };

        let config = Arc::clone(&resolved.config);
        entity.sync_state_mut().configure(Arc::clone(&config));

        let ready = self.registry.is_enabled()
            && !config.remote_base.is_empty()
            && !config.remote_table.is_empty()
            && resolve_unique_identifier(config.unique_identifier.as_ref()).is_some();
        if !ready {
            warn!(entity_type = %label, "Remote sync settings are not enabled for this type");
            entity.sync_state_mut().disable();
            return SyncPhase::Disabled;
        }

        match self.connector.connect(&config) {
            Ok(client) => {
                debug!(entity_type = %label, table = %client.table_key(), "Remote sync enabled");
                entity.sync_state_mut().enable(client);
                SyncPhase::Enabled
            }
            Err(e) => {
                warn!(entity_type = %label, error = %e, "Remote sync disabled");
                entity.sync_state_mut().disable();
                SyncPhase::Disabled
            }
        }
    }

    /// Persist locally, then push to the remote table when allowed.
    ///
    /// A remote failure is returned as [`PushOutcome::Failed`] and kept on
    /// the entity as its last sync error.
    ///
    /// # Errors
    ///
    /// Returns an error only if a local write fails.
    pub fn save<E, S>(&self, store: &mut S, entity: &mut E) -> Result<PushOutcome>
    where
        E: Syncable,
        S: LocalStore<E> + ?Sized,
    {
        store.persist(entity)?;
        self.setup(entity);

        if !entity.sync_state().is_enabled() {
            if entity.sync_state().push_to_remote {
                warn!(entity_type = %entity.type_label(), "Skipping remote push: sync disabled");
            }
            return Ok(PushOutcome::Disabled);
        }
        if !entity.sync_state().push_to_remote
            || !self.registry.push_on_save()
            || crate::is_push_suspended()
        {
            debug!(entity_type = %entity.type_label(), "Remote push suppressed");
            return Ok(PushOutcome::Suppressed);
        }

        entity.sync_state_mut().invalidate_export_cache();
        let previous = entity.sync_state().external_record_id.clone();

        match self.create_or_update_remote(entity) {
            Ok(outcome) => {
                entity.sync_state_mut().set_last_sync_error(None);
                if entity.sync_state().external_record_id != previous {
                    store.persist(entity)?;
                }
                Ok(outcome)
            }
            Err(e) => {
                let action = if previous.is_empty() {
                    PushAction::Create
                } else {
                    PushAction::Update
                };
                let error = PushError {
                    action,
                    details: e.details(),
                };
                warn!(entity_type = %entity.type_label(), "{error}");
                entity.sync_state_mut().set_last_sync_error(Some(error.clone()));
                Ok(PushOutcome::Failed { error })
            }
        }
    }

    /// Update the remote row this entity points at, or find or create one.
    ///
    /// A stored external id that no longer exists remotely falls back to
    /// the match-then-create path. The resulting row id is stored on the
    /// entity.
    ///
    /// # Errors
    ///
    /// Returns the first remote error encountered.
    pub fn create_or_update_remote<E: Syncable + ?Sized>(
        &self,
        entity: &mut E,
    ) -> std::result::Result<PushOutcome, RemoteError> {
        let (client, config) = bound(entity)?;
        let fields = export_payload(entity, &config);
        let existing = entity.sync_state().external_record_id.clone();

        if !existing.is_empty() {
            if self.check_record_exists(entity, &existing)? {
                let record = client.update(&existing, &fields)?;
                entity.sync_state_mut().external_record_id.clone_from(&record.id);
                return Ok(PushOutcome::Updated {
                    remote_id: record.id,
                });
            }
            info!(
                entity_type = %entity.type_label(),
                external_record_id = %existing,
                "Remote record is gone, creating it again"
            );
        }

        let matched = self.match_remote(entity)?;
        let outcome = if matched.is_empty() {
            PushOutcome::Created {
                remote_id: client.create(&fields)?.id,
            }
        } else {
            PushOutcome::Updated {
                remote_id: client.update(&matched, &fields)?.id,
            }
        };

        if let Some(remote_id) = outcome.remote_id() {
            entity.sync_state_mut().external_record_id = remote_id.to_string();
        }
        Ok(outcome)
    }

    /// Id of the remote row whose unique-identifier column matches this
    /// entity, or an empty string.
    ///
    /// Several matches resolve to the first one.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is not bound or the search fails.
    pub fn match_remote<E: Syncable + ?Sized>(&self, entity: &E) -> std::result::Result<String, RemoteError> {
        let (client, config) = bound(entity)?;
        let Some((column, field)) = resolve_unique_identifier(config.unique_identifier.as_ref()) else {
            return Ok(String::new());
        };

        let value = entity
            .field_value(&field)
            .map(|v| value_to_search_text(&v))
            .unwrap_or_default();
        if value.is_empty() {
            return Ok(String::new());
        }

        let records = client.search(&column, &value)?;
        let Some(first) = records.first() else {
            return Ok(String::new());
        };
        if records.len() > 1 {
            warn!(
                column = %column,
                value = %value,
                matches = records.len(),
                using = %first.id,
                "Several remote records match; using the first"
            );
        }
        Ok(first.id.clone())
    }

    /// Whether a remote row with this id exists.
    ///
    /// # Errors
    ///
    /// Returns any remote error other than not-found.
    pub fn check_record_exists<E: Syncable + ?Sized>(
        &self,
        entity: &E,
        record_id: &str,
    ) -> std::result::Result<bool, RemoteError> {
        let (client, _) = bound(entity)?;
        match client.get(record_id) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Best-effort remote delete, then the local delete.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local delete fails.
    pub fn delete<E, S>(&self, store: &mut S, entity: &mut E) -> Result<PushOutcome>
    where
        E: Syncable,
        S: LocalStore<E> + ?Sized,
    {
        self.setup(entity);
        let external_id = entity.sync_state().external_record_id.clone();

        let outcome = if !entity.sync_state().is_enabled() {
            PushOutcome::Disabled
        } else if external_id.is_empty()
            || !entity.sync_state().push_to_remote
            || crate::is_push_suspended()
        {
            PushOutcome::Suppressed
        } else {
            match bound(entity).and_then(|(client, _)| client.delete(&external_id)) {
                Ok(response) => {
                    if !response.deleted {
                        warn!(external_record_id = %external_id, "Remote delete reported nothing deleted");
                    }
                    PushOutcome::Deleted {
                        remote_id: external_id,
                    }
                }
                Err(e) => {
                    let error = PushError {
                        action: PushAction::Delete,
                        details: e.details(),
                    };
                    warn!(entity_type = %entity.type_label(), "{error}");
                    entity.sync_state_mut().set_last_sync_error(Some(error.clone()));
                    PushOutcome::Failed { error }
                }
            }
        };

        store.remove(entity)?;
        Ok(outcome)
    }

    /// Link to the entity's remote row, if the type has a browse URL and
    /// the entity is synced.
    pub fn record_url<E: Syncable + ?Sized>(&self, entity: &mut E) -> Option<String> {
        if self.setup(entity) != SyncPhase::Enabled {
            return None;
        }
        let external_id = &entity.sync_state().external_record_id;
        if external_id.is_empty() {
            return None;
        }
        let base = entity.sync_state().config()?.remote_url.as_deref()?;
        Some(format!("{}/{external_id}", base.trim_end_matches('/')))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

type Binding = (Arc<dyn RemoteTableClient>, Arc<SyncConfiguration>);

fn bound<E: Syncable + ?Sized>(entity: &E) -> std::result::Result<Binding, RemoteError> {
    let state = entity.sync_state();
    match (state.client(), state.config()) {
        (Some(client), Some(config)) => Ok((Arc::clone(client), Arc::clone(config))),
        _ => Err(RemoteError::NotConfigured(format!(
            "{} is not bound to a remote table",
            entity.type_label()
        ))),
    }
}

fn export_payload<E: Syncable + ?Sized>(entity: &mut E, config: &SyncConfiguration) -> FieldMap {
    let computed = (!entity.sync_state().has_cached_export()).then(|| entity.export_fields(config));
    entity
        .sync_state_mut()
        .export_fields_with(|| computed.unwrap_or_default())
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, UniqueIdentifier};
    use crate::model::Record;
    use crate::remote::{CallCounts, MemoryConnector, MemoryTable, RemoteRecord};
    use crate::storage::SqliteStorage;
    use crate::PushSuspension;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn settings(enabled: bool) -> Settings {
        let mut cfg = SyncConfiguration {
            remote_base: "app1".into(),
            remote_table: "Posts".into(),
            remote_url: Some("https://remote.example/app1/Posts/".into()),
            unique_identifier: Some(UniqueIdentifier::Mapping(BTreeMap::from([(
                "Slug".to_string(),
                "slug".to_string(),
            )]))),
            ..SyncConfiguration::default()
        };
        cfg.import_mapping.insert("Title".into(), "title".into());
        cfg.import_mapping.insert("Slug".into(), "slug".into());

        let mut settings = Settings {
            enabled,
            ..Settings::default()
        };
        settings.types.insert("blog.Post".into(), cfg);
        settings
    }

    fn build_engine(settings: &Settings) -> (SyncEngine, Arc<MemoryTable>) {
        let connector = Arc::new(MemoryConnector::new());
        let table = connector.table("app1", "Posts");
        let registry = Arc::new(Registry::from_settings(settings).unwrap());
        (SyncEngine::new(registry, connector).unwrap(), table)
    }

    fn post(title: &str, slug: &str) -> Record {
        let mut record = Record::new("blog.Post");
        record.values.insert("title".into(), json!(title));
        record.values.insert("slug".into(), json!(slug));
        record
    }

    fn row(id: &str, title: &str, slug: &str) -> RemoteRecord {
        RemoteRecord::new(
            id,
            json!({"Title": title, "Slug": slug}).as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_new_rejects_unusable_unique_identifier() {
        let mut settings = settings(true);
        settings.types.get_mut("blog.Post").unwrap().unique_identifier =
            Some(UniqueIdentifier::Mapping(BTreeMap::new()));
        let registry = Arc::new(Registry::from_settings(&settings).unwrap());
        let err = SyncEngine::new(registry, Arc::new(MemoryConnector::new())).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (engine, _) = build_engine(&settings(true));
        let mut record = post("A", "a");
        assert_eq!(engine.setup(&mut record), SyncPhase::Enabled);
        assert!(record.sync.client().is_some());

        record.sync.disable();
        assert_eq!(engine.setup(&mut record), SyncPhase::Disabled);
    }

    #[test]
    fn test_setup_disabled_when_sync_off_or_type_unknown() {
        let (engine, _) = build_engine(&settings(false));
        let mut record = post("A", "a");
        assert_eq!(engine.setup(&mut record), SyncPhase::Disabled);
        assert!(record.sync.config().is_some());

        let (engine, _) = build_engine(&settings(true));
        let mut other = Record::new("blog.Comment");
        assert_eq!(engine.setup(&mut other), SyncPhase::Disabled);
    }

    #[test]
    fn test_save_creates_remote_row_and_stores_id() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");

        let outcome = engine.save(&mut storage, &mut record).unwrap();
        let PushOutcome::Created { remote_id } = outcome else {
            panic!("expected create, got {outcome:?}");
        };
        assert_eq!(record.external_record_id(), remote_id);
        assert_eq!(table.row(&remote_id).unwrap().fields["Title"], "A");

        let stored = storage.get_record(record.id.unwrap()).unwrap().unwrap();
        assert_eq!(stored.external_record_id(), remote_id);
    }

    #[test]
    fn test_save_matches_existing_remote_row_instead_of_duplicating() {
        let (engine, table) = build_engine(&settings(true));
        table.insert_rows([row("recEXIST", "Old", "a")]);
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("New", "a");

        let outcome = engine.save(&mut storage, &mut record).unwrap();
        assert_eq!(outcome, PushOutcome::Updated { remote_id: "recEXIST".into() });
        assert_eq!(record.external_record_id(), "recEXIST");
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.row("recEXIST").unwrap().fields["Title"], "New");
        assert_eq!(table.calls().create, 0);
    }

    #[test]
    fn test_save_ambiguous_match_uses_first() {
        let (engine, table) = build_engine(&settings(true));
        table.insert_rows([row("recFIRST", "A", "a"), row("recSECOND", "A", "a")]);
        let mut record = post("A", "a");
        engine.setup(&mut record);
        assert_eq!(engine.match_remote(&record).unwrap(), "recFIRST");
    }

    #[test]
    fn test_save_updates_existing_external_id() {
        let (engine, table) = build_engine(&settings(true));
        table.insert_rows([row("rec1", "A", "a")]);
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("B", "a");
        record.set_external_record_id("rec1");

        let outcome = engine.save(&mut storage, &mut record).unwrap();
        assert_eq!(outcome, PushOutcome::Updated { remote_id: "rec1".into() });
        assert_eq!(table.calls().search, 0);
        assert_eq!(table.row("rec1").unwrap().fields["Title"], "B");
    }

    #[test]
    fn test_save_recreates_when_external_id_is_gone() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");
        record.set_external_record_id("recGONE");

        let outcome = engine.save(&mut storage, &mut record).unwrap();
        assert!(matches!(outcome, PushOutcome::Created { .. }));
        assert_ne!(record.external_record_id(), "recGONE");
        assert_eq!(table.rows().len(), 1);
    }

    #[test]
    fn test_save_failure_keeps_local_write() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");
        table.fail_next(RemoteError::Http(
            "422 Client Error: Unprocessable Entity for url: https://api.example/v0/app1/Posts \
             [Error: {'type': 'INVALID_VALUE', 'message': 'Bad value'}]"
                .into(),
        ));

        let outcome = engine.save(&mut storage, &mut record).unwrap();
        let PushOutcome::Failed { error } = outcome else {
            panic!("expected failure");
        };
        assert_eq!(error.action, PushAction::Create);
        assert_eq!(error.to_string(), "Could not create remote record. Reason: Bad value");
        assert_eq!(record.sync.last_sync_error(), Some(&error));
        assert!(record.external_record_id().is_empty());
        assert_eq!(storage.count_records("blog.Post").unwrap(), 1);
    }

    #[test]
    fn test_save_suppressed_by_instance_flag_setting_and_guard() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();

        let mut record = post("A", "a");
        record.sync.push_to_remote = false;
        assert_eq!(engine.save(&mut storage, &mut record).unwrap(), PushOutcome::Suppressed);

        let mut off = settings(true);
        off.push_on_save = false;
        let (quiet_engine, _) = build_engine(&off);
        let mut other = post("B", "b");
        assert_eq!(quiet_engine.save(&mut storage, &mut other).unwrap(), PushOutcome::Suppressed);

        {
            let _guard = PushSuspension::new();
            let mut third = post("C", "c");
            assert_eq!(engine.save(&mut storage, &mut third).unwrap(), PushOutcome::Suppressed);
        }

        assert_eq!(table.calls(), CallCounts::default());
        assert_eq!(storage.count_records("blog.Post").unwrap(), 3);
    }

    #[test]
    fn test_save_disabled_still_persists() {
        let (engine, table) = build_engine(&settings(false));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");
        assert_eq!(engine.save(&mut storage, &mut record).unwrap(), PushOutcome::Disabled);
        assert!(record.id.is_some());
        assert!(table.rows().is_empty());
    }

    #[test]
    fn test_delete_is_best_effort() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");
        engine.save(&mut storage, &mut record).unwrap();
        let remote_id = record.external_record_id().to_string();

        table.fail_next(RemoteError::Http("503 Server Error: Service Unavailable for url: x".into()));
        let outcome = engine.delete(&mut storage, &mut record).unwrap();
        assert!(matches!(outcome, PushOutcome::Failed { .. }));
        assert!(storage.get_record(record.id.unwrap()).unwrap().is_none());
        assert!(table.row(&remote_id).is_some());
    }

    #[test]
    fn test_delete_removes_remote_row() {
        let (engine, table) = build_engine(&settings(true));
        let mut storage = SqliteStorage::open_memory().unwrap();
        let mut record = post("A", "a");
        engine.save(&mut storage, &mut record).unwrap();

        let outcome = engine.delete(&mut storage, &mut record).unwrap();
        assert!(matches!(outcome, PushOutcome::Deleted { .. }));
        assert!(table.rows().is_empty());
    }

    #[test]
    fn test_check_record_exists_maps_not_found_to_false() {
        let (engine, table) = build_engine(&settings(true));
        table.insert_rows([row("rec1", "A", "a")]);
        let mut record = post("A", "a");
        engine.setup(&mut record);
        assert!(engine.check_record_exists(&record, "rec1").unwrap());
        assert!(!engine.check_record_exists(&record, "recNOPE").unwrap());

        table.fail_next(RemoteError::Http("500 Server Error: Internal for url: x [Error: {'type': 'X', 'message': 'y'}]".into()));
        assert!(engine.check_record_exists(&record, "rec1").is_err());
    }

    #[test]
    fn test_record_url() {
        let (engine, _) = build_engine(&settings(true));
        let mut record = post("A", "a");
        assert_eq!(engine.record_url(&mut record), None);
        record.set_external_record_id("rec9");
        assert_eq!(
            engine.record_url(&mut record).as_deref(),
            Some("https://remote.example/app1/Posts/rec9")
        );
    }
}
