//! Reset command implementation.

use crate::cli::commands::{load_registry, open_storage};
use crate::error::Result;
use crate::sync::reset;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct ResetOutput {
    reset: usize,
    types: Vec<String>,
}

/// Clear every stored external id so the next import rematches by
/// unique identifier.
///
/// # Errors
///
/// Returns an error if the database or settings cannot be opened.
pub fn execute(
    config_path: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    actor: Option<&str>,
    json: bool,
) -> Result<()> {
    let (_, registry) = load_registry(config_path)?;
    let mut storage = open_storage(db_path, actor)?;

    let count = reset(&mut storage, &registry)?;

    if json {
        let output = ResetOutput {
            reset: count,
            types: registry.labels(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Set {count} records to external_record_id=''");
    }

    Ok(())
}
