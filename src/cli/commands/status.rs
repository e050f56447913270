//! Status command implementation.

use crate::cli::commands::{load_registry, open_storage};
use crate::error::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    enabled: bool,
    push_on_save: bool,
    types: Vec<TypeStatus>,
}

#[derive(Serialize)]
struct TypeStatus {
    entity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    equivalent_of: Option<String>,
    remote_base: String,
    remote_table: String,
    import_allowed: bool,
    records: usize,
    synced: usize,
}

/// Show every configured type with its table and local counts.
///
/// # Errors
///
/// Returns an error if the database or settings cannot be opened.
pub fn execute(
    config_path: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let (_, registry) = load_registry(config_path)?;
    let storage = open_storage(db_path, None)?;

    let mut types = Vec::new();
    for resolved in registry.iter() {
        types.push(TypeStatus {
            entity_type: resolved.label.clone(),
            equivalent_of: resolved.is_equivalent().then(|| resolved.canonical.clone()),
            remote_base: resolved.config.remote_base.clone(),
            remote_table: resolved.config.remote_table.clone(),
            import_allowed: resolved.config.import_allowed,
            records: storage.count_records(&resolved.label)?,
            synced: storage.count_synced(&resolved.label)?,
        });
    }

    let output = StatusOutput {
        enabled: registry.is_enabled(),
        push_on_save: registry.push_on_save(),
        types,
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let flag = |on: bool| if on { "on".green() } else { "off".red() };
    println!("{}", "Sync".cyan().bold());
    println!("  Enabled:      {}", flag(output.enabled));
    println!("  Push on save: {}", flag(output.push_on_save));
    println!();

    if output.types.is_empty() {
        println!("No entity types configured.");
        return Ok(());
    }

    println!("{}", "Types".cyan().bold());
    for t in &output.types {
        let mut line = format!(
            "  {} -> {}/{}  {}/{} synced",
            t.entity_type.bold(),
            t.remote_base,
            t.remote_table,
            t.synced,
            t.records
        );
        if let Some(canonical) = &t.equivalent_of {
            line.push_str(&format!(" {}", format!("(as {canonical})").dimmed()));
        }
        if !t.import_allowed {
            line.push_str(&format!(" {}", "[no import]".yellow()));
        }
        println!("{line}");
    }

    Ok(())
}
