//! Remote table access.
//!
//! The sync engine talks to the remote spreadsheet service only through the
//! [`RemoteTableClient`] trait. Clients are produced per table by a
//! [`RemoteConnector`], which is handed to the engine at construction time:
//!
//! - [`AirtableConnector`] - real HTTP client
//! - [`MemoryConnector`] - in-process tables for tests and offline runs

mod airtable;
mod error;
mod memory;

pub use airtable::{AirtableClient, AirtableConnector, DEFAULT_API_ENDPOINT};
pub use error::{parse_request_error, ErrorDetails, RemoteError};
pub use memory::{CallCounts, MemoryConnector, MemoryTable};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::SyncConfiguration;

/// A field dictionary, keyed by column or field name.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// One row of the remote table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(default)]
    pub fields: FieldMap,
}

impl RemoteRecord {
    #[must_use]
    pub fn new(id: impl Into<String>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Response body of a delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
    #[serde(default)]
    pub id: String,
}

/// Identity of a remote table, used to share fetched rows between entity
/// types that point at the same table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TableKey {
    pub base: String,
    pub table: String,
}

impl TableKey {
    #[must_use]
    pub fn new(base: &str, table: &str) -> Self {
        Self {
            base: base.to_string(),
            table: table.to_string(),
        }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.table)
    }
}

/// Blocking access to one remote table.
///
/// Every call blocks the caller until the remote service answers.
pub trait RemoteTableClient: Send + Sync {
    /// Table this client is bound to.
    fn table_key(&self) -> TableKey;

    /// Fetch one row by id. A missing row is an error whose
    /// [`RemoteError::is_not_found`] is true.
    fn get(&self, record_id: &str) -> Result<RemoteRecord, RemoteError>;

    /// Insert a row and return it with its new id.
    fn create(&self, fields: &FieldMap) -> Result<RemoteRecord, RemoteError>;

    /// Patch the given columns of an existing row.
    fn update(&self, record_id: &str, fields: &FieldMap) -> Result<RemoteRecord, RemoteError>;

    /// Delete a row.
    fn delete(&self, record_id: &str) -> Result<DeleteResponse, RemoteError>;

    /// Rows whose `column` equals `value`, in table order.
    fn search(&self, column: &str, value: &str) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Every row of the table.
    fn list_all(&self) -> Result<Vec<RemoteRecord>, RemoteError>;
}

/// Builds table clients for sync configurations.
pub trait RemoteConnector: Send + Sync {
    /// Return a client bound to `config.remote_base` / `config.remote_table`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::NotConfigured`] when credentials are missing.
    fn connect(&self, config: &SyncConfiguration) -> Result<Arc<dyn RemoteTableClient>, RemoteError>;
}

/// Render a JSON cell value the way the remote search formula expects it.
#[must_use]
pub fn value_to_search_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
