//! Initialize a tablesync workspace.
//!
//! Writes a sample settings file (one `blog.Post` type mapped to a `Posts`
//! table) and creates the local database. Sync stays disabled until the
//! settings are filled in and `enabled` is set.

use crate::config::{resolve_db_path, sample_settings, save_settings, LOCAL_CONFIG_FILE};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct InitOutput {
    config: PathBuf,
    database: PathBuf,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] if the settings file exists and
/// `force` is not set, or an error if the files cannot be written.
pub fn execute(
    config_path: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    force: bool,
    json: bool,
) -> Result<()> {
    let config = config_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));

    if config.exists() && !force {
        return Err(Error::AlreadyInitialized { path: config });
    }

    let database = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine the database location".to_string())
    })?;

    save_settings(&config, &sample_settings())?;
    create_database(&database)?;

    if json {
        let output = InitOutput { config, database };
        let payload = serde_json::to_string(&output)?;
        println!("{payload}");
    } else {
        println!("Initialized tablesync");
        println!("  Settings: {}", config.display());
        println!("  Database: {}", database.display());
        println!();
        println!("Next: fill in remote_base and api_key, set \"enabled\": true, then run 'tsync import blog'.");
    }

    Ok(())
}

/// Opening applies the schema, so the file is usable right away.
fn create_database(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    SqliteStorage::open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_settings;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_settings_and_database() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("tablesync.json");
        let db = temp.path().join("data").join("tablesync.db");

        execute(Some(&config), Some(&db), false, false).unwrap();

        assert!(db.exists());
        let settings = load_settings(Some(&config)).unwrap();
        assert!(settings.types.contains_key("blog.Post"));
    }

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("tablesync.json");
        let db = temp.path().join("tablesync.db");

        execute(Some(&config), Some(&db), false, false).unwrap();
        let result = execute(Some(&config), Some(&db), false, false);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));

        assert!(execute(Some(&config), Some(&db), true, false).is_ok());
    }
}
