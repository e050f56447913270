//! In-process remote tables.
//!
//! `MemoryTable` behaves like a remote table without a network: ids are
//! generated, missing rows answer with the same 404 line the HTTP client
//! produces, and every call is counted so tests can assert on traffic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use super::{
    value_to_search_text, DeleteResponse, FieldMap, RemoteConnector, RemoteError, RemoteRecord,
    RemoteTableClient, TableKey,
};
use crate::config::SyncConfiguration;

/// Number of calls made per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallCounts {
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub search: usize,
    pub list_all: usize,
}

#[derive(Debug, Default)]
struct TableState {
    rows: Vec<RemoteRecord>,
    calls: CallCounts,
    fail_next: Option<RemoteError>,
}

/// A remote table held in memory.
#[derive(Debug)]
pub struct MemoryTable {
    key: TableKey,
    state: Mutex<TableState>,
}

impl MemoryTable {
    #[must_use]
    pub fn new(base: &str, table: &str) -> Self {
        Self {
            key: TableKey::new(base, table),
            state: Mutex::new(TableState::default()),
        }
    }

    /// Seed rows without counting calls.
    pub fn insert_rows(&self, rows: impl IntoIterator<Item = RemoteRecord>) {
        self.lock().rows.extend(rows);
    }

    /// Current rows, in insertion order.
    #[must_use]
    pub fn rows(&self) -> Vec<RemoteRecord> {
        self.lock().rows.clone()
    }

    #[must_use]
    pub fn row(&self, id: &str) -> Option<RemoteRecord> {
        self.lock().rows.iter().find(|r| r.id == id).cloned()
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn reset_calls(&self) {
        self.lock().calls = CallCounts::default();
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().fail_next = Some(error);
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_url(&self, id: &str) -> String {
        format!("memory://{}/{}/{id}", self.key.base, self.key.table)
    }

    fn begin(&self, count: impl FnOnce(&mut CallCounts)) -> Result<MutexGuard<'_, TableState>, RemoteError> {
        let mut state = self.lock();
        count(&mut state.calls);
        match state.fail_next.take() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

fn new_record_id() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string();
    format!("rec{}", &raw[..14])
}

impl RemoteTableClient for MemoryTable {
    fn table_key(&self) -> TableKey {
        self.key.clone()
    }

    fn get(&self, record_id: &str) -> Result<RemoteRecord, RemoteError> {
        let state = self.begin(|c| c.get += 1)?;
        state
            .rows
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(&self.record_url(record_id)))
    }

    fn create(&self, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.begin(|c| c.create += 1)?;
        let record = RemoteRecord::new(new_record_id(), fields.clone());
        state.rows.push(record.clone());
        Ok(record)
    }

    fn update(&self, record_id: &str, fields: &FieldMap) -> Result<RemoteRecord, RemoteError> {
        let mut state = self.begin(|c| c.update += 1)?;
        let Some(row) = state.rows.iter_mut().find(|r| r.id == record_id) else {
            return Err(RemoteError::not_found(&self.record_url(record_id)));
        };
        for (column, value) in fields {
            row.fields.insert(column.clone(), value.clone());
        }
        Ok(row.clone())
    }

    fn delete(&self, record_id: &str) -> Result<DeleteResponse, RemoteError> {
        let mut state = self.begin(|c| c.delete += 1)?;
        let before = state.rows.len();
        state.rows.retain(|r| r.id != record_id);
        if state.rows.len() == before {
            return Err(RemoteError::not_found(&self.record_url(record_id)));
        }
        Ok(DeleteResponse {
            deleted: true,
            id: record_id.to_string(),
        })
    }

    fn search(&self, column: &str, value: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let state = self.begin(|c| c.search += 1)?;
        Ok(state
            .rows
            .iter()
            .filter(|r| {
                r.fields
                    .get(column)
                    .is_some_and(|v| value_to_search_text(v) == value)
            })
            .cloned()
            .collect())
    }

    fn list_all(&self) -> Result<Vec<RemoteRecord>, RemoteError> {
        let state = self.begin(|c| c.list_all += 1)?;
        Ok(state.rows.clone())
    }
}

/// Hands out shared [`MemoryTable`]s keyed by base/table.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    tables: Mutex<HashMap<TableKey, Arc<MemoryTable>>>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The table for `base`/`table`, created empty on first use.
    pub fn table(&self, base: &str, table: &str) -> Arc<MemoryTable> {
        let mut tables = match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            tables
                .entry(TableKey::new(base, table))
                .or_insert_with(|| Arc::new(MemoryTable::new(base, table))),
        )
    }
}

impl RemoteConnector for MemoryConnector {
    fn connect(
        &self,
        config: &SyncConfiguration,
    ) -> Result<Arc<dyn RemoteTableClient>, RemoteError> {
        let table: Arc<dyn RemoteTableClient> = self.table(&config.remote_base, &config.remote_table);
        Ok(table)
    }
}
