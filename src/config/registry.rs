//! Flat lookup from entity type to its sync configuration.
//!
//! Built once from [`Settings`]: every configured type and every equivalent
//! type it lists becomes one entry pointing at the shared configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::settings::{Settings, SyncConfiguration};
use crate::error::{Error, Result};
use crate::model::EntitySchema;
use crate::remote::TableKey;

/// One entity type with its resolved configuration.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    /// `app.Model` identifier of this type.
    pub label: String,
    /// Type whose configuration entry this one came from.
    pub canonical: String,
    pub config: Arc<SyncConfiguration>,
    pub schema: EntitySchema,
}

impl ResolvedType {
    /// Whether this type borrows another type's configuration.
    #[must_use]
    pub fn is_equivalent(&self) -> bool {
        self.label != self.canonical
    }

    #[must_use]
    pub fn table_key(&self) -> TableKey {
        TableKey::new(&self.config.remote_base, &self.config.remote_table)
    }

    /// Application part of the label (`blog` for `blog.Post`).
    #[must_use]
    pub fn app_label(&self) -> &str {
        app_label(&self.label)
    }
}

/// Immutable type registry plus the process-wide sync flags.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    enabled: bool,
    push_on_save: bool,
    push_message: Option<String>,
    types: BTreeMap<String, Arc<ResolvedType>>,
}

impl Registry {
    /// Resolve settings into a flat registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed type identifiers or a type
    /// configured more than once.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut types = BTreeMap::new();

        for (label, config) in &settings.types {
            check_label(label)?;
            let config = Arc::new(config.clone());

            let members = std::iter::once(label).chain(config.equivalent_types.iter());
            for member in members {
                check_label(member)?;
                if types.contains_key(member) {
                    return Err(Error::Config(format!(
                        "entity type {member} is configured more than once"
                    )));
                }
                let resolved = ResolvedType {
                    label: member.clone(),
                    canonical: label.clone(),
                    schema: EntitySchema {
                        entity_type: member.clone(),
                        fields: config.fields.clone(),
                        tree: config.tree,
                    },
                    config: Arc::clone(&config),
                };
                types.insert(member.clone(), Arc::new(resolved));
            }
        }

        debug!(types = types.len(), enabled = settings.enabled, "Registry resolved");

        Ok(Self {
            enabled: settings.enabled,
            push_on_save: settings.push_on_save,
            push_message: settings.push_message.clone(),
            types,
        })
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Arc<ResolvedType>> {
        self.types.get(label)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn push_on_save(&self) -> bool {
        self.push_on_save
    }

    #[must_use]
    pub fn push_message(&self) -> Option<&str> {
        self.push_message.as_deref()
    }

    /// All known type identifiers, sorted.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResolvedType>> {
        self.types.values()
    }

    /// Types configured directly, in label order.
    pub fn canonical_types(&self) -> impl Iterator<Item = &Arc<ResolvedType>> {
        self.types.values().filter(|t| !t.is_equivalent())
    }

    /// Equivalent types that share `canonical`'s configuration, in declared order.
    #[must_use]
    pub fn equivalents_of(&self, canonical: &str) -> Vec<Arc<ResolvedType>> {
        let Some(resolved) = self.types.get(canonical) else {
            return Vec::new();
        };
        resolved
            .config
            .equivalent_types
            .iter()
            .filter_map(|label| self.types.get(label).cloned())
            .collect()
    }

    /// Every type whose app label is `app`.
    #[must_use]
    pub fn app_types(&self, app: &str) -> Vec<String> {
        self.types
            .values()
            .filter(|t| t.app_label() == app)
            .map(|t| t.label.clone())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn app_label(label: &str) -> &str {
    label.split_once('.').map_or(label, |(app, _)| app)
}

fn check_label(label: &str) -> Result<()> {
    match label.split_once('.') {
        Some((app, model)) if !app.is_empty() && !model.is_empty() && !model.contains('.') => {
            Ok(())
        }
        _ => Err(Error::Config(format!(
            "entity type '{label}' must be in app.Model form"
        ))),
    }
}
