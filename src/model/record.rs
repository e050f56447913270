//! Generic local record.
//!
//! Every configured entity type is stored as a [`Record`]: scalar field
//! values as a JSON map, multi-valued relations as label sets, and an
//! optional tree position for content-tree resources.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SyncConfiguration;
use crate::mapping::map_export;
use crate::model::EntitySchema;
use crate::remote::FieldMap;
use crate::sync::{content_hash, SyncState, Syncable};

/// Placement and publication state of a content-tree resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreePosition {
    pub parent_id: Option<i64>,
    /// Locked resources are never modified by import.
    pub locked: bool,
    pub live: bool,
    pub has_unpublished_changes: bool,
}

/// A local record of any configured type.
#[derive(Debug, Clone)]
pub struct Record {
    /// Local primary key; `None` until first persisted.
    pub id: Option<i64>,
    pub entity_type: String,
    pub values: FieldMap,
    pub relations: BTreeMap<String, BTreeSet<String>>,
    pub tree: Option<TreePosition>,
    pub sync: SyncState,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The persisted, comparable part of a record.
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    values: &'a FieldMap,
    relations: &'a BTreeMap<String, BTreeSet<String>>,
    external_record_id: &'a str,
    tree: Option<&'a TreePosition>,
}

impl Record {
    /// A new, unsaved record.
    #[must_use]
    pub fn new(entity_type: &str) -> Self {
        Self {
            id: None,
            entity_type: entity_type.to_string(),
            values: FieldMap::new(),
            relations: BTreeMap::new(),
            tree: None,
            sync: SyncState::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// A new record laid out for `schema`; tree types get a default position.
    #[must_use]
    pub fn for_schema(schema: &EntitySchema) -> Self {
        let mut record = Self::new(&schema.entity_type);
        if schema.tree {
            record.tree = Some(TreePosition::default());
        }
        record
    }

    #[must_use]
    pub fn external_record_id(&self) -> &str {
        &self.sync.external_record_id
    }

    pub fn set_external_record_id(&mut self, id: &str) {
        self.sync.external_record_id = id.to_string();
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.tree.as_ref().is_some_and(|t| t.locked)
    }

    /// Assign one validated field.
    ///
    /// Multi-valued fields replace the whole label set; everything else is
    /// a scalar assignment.
    pub fn apply_field(&mut self, schema: &EntitySchema, name: &str, value: &Value) {
        if schema.is_multi(name) {
            let labels = match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
                Value::String(s) if !s.is_empty() => std::iter::once(s.clone()).collect(),
                _ => BTreeSet::new(),
            };
            self.relations.insert(name.to_string(), labels);
        } else {
            self.values.insert(name.to_string(), value.clone());
        }
    }

    /// Assign every field in `fields`.
    pub fn apply_fields(&mut self, schema: &EntitySchema, fields: &FieldMap) {
        for (name, value) in fields {
            self.apply_field(schema, name, value);
        }
    }

    /// Stable fingerprint of the persisted state, used to skip no-op saves.
    #[must_use]
    pub fn content_hash(&self) -> String {
        content_hash(&Snapshot {
            values: &self.values,
            relations: &self.relations,
            external_record_id: &self.sync.external_record_id,
            tree: self.tree.as_ref(),
        })
    }

    /// Full JSON view for display and revisions.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut obj = serde_json::json!({
            "id": self.id,
            "entity_type": self.entity_type,
            "external_record_id": self.sync.external_record_id,
            "values": self.values,
            "relations": self.relations,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        });
        if let Some(tree) = &self.tree {
            obj["tree"] = serde_json::to_value(tree).unwrap_or_default();
        }
        obj
    }
}

impl Syncable for Record {
    fn type_label(&self) -> &str {
        &self.entity_type
    }

    fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    fn sync_state_mut(&mut self) -> &mut SyncState {
        &mut self.sync
    }

    fn field_value(&self, field: &str) -> Option<Value> {
        if field == "id" || field == "pk" {
            return self.id.map(Value::from);
        }
        if let Some(labels) = self.relations.get(field) {
            return Some(Value::Array(
                labels.iter().cloned().map(Value::String).collect(),
            ));
        }
        self.values.get(field).cloned()
    }

    fn export_fields(&self, config: &SyncConfiguration) -> FieldMap {
        map_export(config.export_mapping(), |field| self.field_value(field))
    }
}
