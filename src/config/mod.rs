//! Configuration management.
//!
//! This module locates and loads the settings file, applies environment
//! overrides, and resolves the local database path.
//!
//! # Layout
//!
//! - **Settings**: `./tablesync.json`, falling back to `~/.tablesync/config.json`
//! - **Database**: `~/.tablesync/data/tablesync.db`

mod registry;
mod settings;

pub use registry::{Registry, ResolvedType};
pub use settings::{ParentContainer, Settings, SyncConfiguration, UniqueIdentifier};

use crate::error::{Error, Result};

use std::fs;
use std::path::{Path, PathBuf};

/// Settings file name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tablesync.json";

/// Get the global tablesync directory (`~/.tablesync/`).
#[must_use]
pub fn global_tablesync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".tablesync"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `TSYNC_DB` environment variable
/// 3. Global location: `~/.tablesync/data/tablesync.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("TSYNC_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_tablesync_dir().map(|dir| dir.join("data").join("tablesync.db"))
}

/// Resolve the settings file path.
///
/// Priority:
/// 1. `explicit_path` (the `--config` flag)
/// 2. `TSYNC_CONFIG` environment variable
/// 3. `./tablesync.json` if it exists
/// 4. `~/.tablesync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("TSYNC_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }

    global_tablesync_dir().map(|dir| dir.join("config.json"))
}

/// Load settings from `path`, then apply environment overrides.
///
/// A missing file yields default settings (sync disabled, no types).
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be read or parsed.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let mut settings = match path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?
        }
        _ => Settings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Write settings as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(settings)?;
    fs::write(path, content).map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

/// Environment wins over the file for the global flags.
fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(enabled) = var("TSYNC_ENABLED").filter(|v| !v.is_empty()) {
        settings.enabled = is_truthy(&enabled);
    }
    if let Some(key) = var("TSYNC_API_KEY").filter(|v| !v.is_empty()) {
        settings.api_key = Some(key);
    }
    if let Some(endpoint) = var("TSYNC_API_ENDPOINT").filter(|v| !v.is_empty()) {
        settings.api_endpoint = Some(endpoint);
    }
    if let Some(offline) = var("TSYNC_OFFLINE").filter(|v| !v.is_empty()) {
        settings.offline = is_truthy(&offline);
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "0" | "false" | "no" | "off")
}

/// Get the default actor name recorded on audit events.
///
/// Priority:
/// 1. `TSYNC_ACTOR` environment variable
/// 2. System username
/// 3. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("TSYNC_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }

    "unknown".to_string()
}

/// Starter settings written by `tsync init`.
#[must_use]
pub fn sample_settings() -> Settings {
    let mut post = SyncConfiguration {
        remote_base: "appXXXXXXXXXXXXXX".to_string(),
        remote_table: "Posts".to_string(),
        unique_identifier: Some(UniqueIdentifier::Mapping(
            [("Slug".to_string(), "slug".to_string())].into_iter().collect(),
        )),
        ..SyncConfiguration::default()
    };
    post.import_mapping = [("Title", "title"), ("Slug", "slug"), ("Tags", "tags")]
        .into_iter()
        .map(|(c, f)| (c.to_string(), f.to_string()))
        .collect();
    post.fields = vec![
        crate::model::FieldDef::new("title", crate::model::FieldKind::Text)
            .required()
            .max_length(255),
        crate::model::FieldDef::new("slug", crate::model::FieldKind::Slug).required(),
        crate::model::FieldDef::new("tags", crate::model::FieldKind::Tags),
    ];

    Settings {
        types: [("blog.Post".to_string(), post)].into_iter().collect(),
        ..Settings::default()
    }
}
