//! Command implementations.

pub mod completions;
pub mod import;
pub mod init;
pub mod record;
pub mod reset;
pub mod status;
pub mod version;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::{
    default_actor, load_settings, resolve_config_path, resolve_db_path, Registry, Settings,
};
use crate::error::{Error, Result};
use crate::remote::{AirtableConnector, MemoryConnector, RemoteConnector};
use crate::storage::SqliteStorage;
use crate::sync::SyncEngine;

/// Load settings and resolve them into a registry.
///
/// # Errors
///
/// Returns an error if the settings file is unreadable or inconsistent.
pub fn load_registry(config_path: Option<&PathBuf>) -> Result<(Settings, Arc<Registry>)> {
    let path = resolve_config_path(config_path.map(PathBuf::as_path));
    debug!(path = ?path, "Loading settings");
    let settings = load_settings(path.as_deref())?;
    let registry = Registry::from_settings(&settings)?;
    Ok((settings, Arc::new(registry)))
}

/// Open the existing database.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if there is no database yet.
pub fn open_storage(db_path: Option<&PathBuf>, actor: Option<&str>) -> Result<SqliteStorage> {
    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let actor = actor.map(ToString::to_string).unwrap_or_else(default_actor);
    Ok(SqliteStorage::open(&db_path)?.with_actor(&actor))
}

/// Build the sync engine with the connector the settings ask for.
///
/// # Errors
///
/// Returns [`Error::Config`] if a configured type cannot be matched remotely.
pub fn build_engine(settings: &Settings, registry: Arc<Registry>) -> Result<SyncEngine> {
    let connector: Arc<dyn RemoteConnector> = if settings.offline {
        debug!("Using in-process remote tables");
        Arc::new(MemoryConnector::new())
    } else {
        Arc::new(AirtableConnector::new(
            settings.api_key.clone(),
            settings.api_endpoint.clone(),
        ))
    };
    SyncEngine::new(registry, connector)
}
