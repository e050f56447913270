//! Import runs and the external-id reset.
//!
//! Turns the identifiers a user typed into an ordered list of types, then
//! hands each one to a single [`BulkImporter`] so they share one fetch cache.

use std::sync::Arc;

use tracing::info;

use crate::config::{Registry, ResolvedType};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use crate::sync::import::BulkImporter;
use crate::sync::push::SyncEngine;
use crate::sync::types::ImportStats;
use crate::validate::{find_similar_labels, ValidatorSet};
use crate::PushSuspension;

/// Resolve `app.Model` identifiers and bare app labels to configured types.
///
/// An empty request selects every configured type. Types that do not allow
/// import are dropped.
///
/// # Errors
///
/// Returns [`Error::UnknownEntityType`] for the first identifier that
/// matches nothing.
pub fn resolve_labels(registry: &Registry, requested: &[String]) -> Result<Vec<Arc<ResolvedType>>> {
    let labels = registry.labels();
    let mut selected: Vec<Arc<ResolvedType>> = Vec::new();

    let expanded: Vec<String> = if requested.is_empty() {
        registry.canonical_types().map(|t| t.label.clone()).collect()
    } else {
        let mut expanded = Vec::new();
        for label in requested {
            let matches = if label.contains('.') {
                registry.get(label).map(|t| vec![t.label.clone()]).unwrap_or_default()
            } else {
                registry.app_types(label)
            };
            if matches.is_empty() {
                return Err(Error::UnknownEntityType {
                    label: label.clone(),
                    similar: find_similar_labels(label, &labels, 3),
                });
            }
            expanded.extend(matches);
        }
        expanded
    };

    for label in expanded {
        let Some(resolved) = registry.get(&label) else {
            continue;
        };
        if selected.iter().any(|t| t.label == resolved.label) {
            continue;
        }
        if !resolved.config.import_allowed {
            info!(entity_type = %label, "Import is not allowed for this type, skipping");
            continue;
        }
        selected.push(Arc::clone(resolved));
    }
    Ok(selected)
}

/// Order types for one run: each configured type runs right after the
/// equivalent types that share its table.
///
/// When both share a run, the equivalent types only claim rows that already
/// match their own records, so they go first and leave the rest for the
/// configured type to create. An equivalent type imported on its own
/// creates records like any other.
#[must_use]
pub fn import_order(registry: &Registry, selected: &[Arc<ResolvedType>]) -> Vec<Arc<ResolvedType>> {
    let mut ordered: Vec<Arc<ResolvedType>> = Vec::new();
    let mut push = |t: &Arc<ResolvedType>| {
        if !ordered.iter().any(|o| o.label == t.label) {
            ordered.push(Arc::clone(t));
        }
    };

    for resolved in selected {
        if !resolved.is_equivalent() {
            for equivalent in registry.equivalents_of(&resolved.label) {
                if equivalent.config.import_allowed {
                    push(&equivalent);
                }
            }
        }
        push(resolved);
    }
    ordered
}

/// Import the requested types from their remote tables.
///
/// Outgoing pushes are suspended for the whole run.
///
/// # Errors
///
/// Returns an error only for unknown identifiers. Per-type failures are
/// reported inside the returned stats.
pub fn import_types(
    storage: &mut SqliteStorage,
    engine: &SyncEngine,
    validators: &ValidatorSet,
    requested: &[String],
) -> Result<ImportStats> {
    let selected = resolve_labels(engine.registry(), requested)?;
    let ordered = import_order(engine.registry(), &selected);

    let _suspended = PushSuspension::new();
    let mut importer = BulkImporter::new(storage, engine, validators);
    let mut stats = ImportStats::default();
    for resolved in &ordered {
        info!(entity_type = %resolved.label, "Importing");
        let shares_run =
            resolved.is_equivalent() && ordered.iter().any(|o| o.label == resolved.canonical);
        stats.types.push(if shares_run {
            importer.match_type(resolved)
        } else {
            importer.import_type(resolved)
        });
    }
    Ok(stats)
}

/// Clear the external id of every record of every configured and
/// equivalent type, forcing a full rematch on the next import.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn reset(storage: &mut SqliteStorage, registry: &Registry) -> Result<usize> {
    let labels = registry.labels();
    let count = storage.reset_external_ids(&labels)?;
    info!(types = labels.len(), records = count, "External ids reset");
    Ok(count)
}
