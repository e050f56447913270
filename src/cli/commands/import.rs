//! Import command implementation.

use crate::cli::commands::{build_engine, load_registry, open_storage};
use crate::error::Result;
use crate::sync::{import_types, ImportStats, RowOutcome, TypeImport};
use crate::validate::ValidatorSet;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ImportOutput<'a> {
    summary: String,
    created: usize,
    updated: usize,
    skipped: usize,
    types: &'a [TypeImport],
    invalid_rows: Vec<InvalidRow<'a>>,
}

#[derive(Serialize)]
struct InvalidRow<'a> {
    entity_type: &'a str,
    remote_record_id: &'a str,
    errors: String,
    raw_fields: &'a serde_json::Map<String, serde_json::Value>,
}

/// Execute the import command.
///
/// # Errors
///
/// Returns an error if the database or settings cannot be opened, or if a
/// requested type is unknown.
pub fn execute(
    config_path: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    types: &[String],
    json: bool,
) -> Result<()> {
    let (settings, registry) = load_registry(config_path)?;
    let mut storage = open_storage(db_path, actor)?;
    let engine = build_engine(&settings, registry)?;

    let stats = import_types(&mut storage, &engine, &ValidatorSet::default(), types)?;
    let invalid_rows = invalid_rows(&stats);

    if json {
        let output = ImportOutput {
            summary: stats.summary(),
            created: stats.total_created(),
            updated: stats.total_updated(),
            skipped: stats.total_skipped(),
            types: &stats.types,
            invalid_rows,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    for entry in &stats.types {
        let s = entry.stats;
        println!(
            "{} {} created, {} updated, {} skipped",
            format!("{}:", entry.entity_type).cyan(),
            s.created,
            s.updated,
            s.skipped
        );
    }
    for failed in stats.failed_types() {
        if let Some(error) = &failed.error {
            println!("{} {}: {error}", "✗".red(), failed.entity_type);
        }
    }
    for row in &invalid_rows {
        println!(
            "{} {} {}: {}",
            "!".yellow(),
            row.entity_type,
            row.remote_record_id.dimmed(),
            row.errors
        );
    }
    println!("{}", stats.summary().bold());

    Ok(())
}

fn invalid_rows(stats: &ImportStats) -> Vec<InvalidRow<'_>> {
    stats
        .types
        .iter()
        .flat_map(|t| {
            t.results
                .iter()
                .filter(|r| r.outcome == RowOutcome::Failed)
                .map(move |r| InvalidRow {
                    entity_type: &t.entity_type,
                    remote_record_id: &r.remote_record_id,
                    errors: r.errors.as_ref().map(ToString::to_string).unwrap_or_default(),
                    raw_fields: &r.raw_fields,
                })
        })
        .collect()
}
