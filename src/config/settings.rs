//! Settings file types.
//!
//! ```json
//! {
//!   "enabled": true,
//!   "api_key": "key...",
//!   "types": {
//!     "blog.Post": {
//!       "remote_base": "appXXXX",
//!       "remote_table": "Posts",
//!       "unique_identifier": {"Slug": "slug"},
//!       "import_mapping": {"Title": "title", "Slug": "slug"},
//!       "fields": [{"name": "title", "required": true}, {"name": "slug", "kind": "slug"}]
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::FieldDef;

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Process-wide sync switch. When false every entity is disabled.
    pub enabled: bool,
    pub api_key: Option<String>,
    pub api_endpoint: Option<String>,
    /// When false, local saves never push.
    pub push_on_save: bool,
    /// Custom success notice after a push.
    pub push_message: Option<String>,
    /// Raise the default log level to debug.
    pub debug: bool,
    /// Use in-process tables instead of the remote service.
    pub offline: bool,
    /// Per-type configuration keyed by `app.Model`.
    pub types: BTreeMap<String, SyncConfiguration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            api_endpoint: None,
            push_on_save: true,
            push_message: None,
            debug: false,
            offline: false,
            types: BTreeMap::new(),
        }
    }
}

/// Remote-table configuration for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfiguration {
    pub remote_base: String,
    pub remote_table: String,
    /// Browse URL prefix used to build record links.
    pub remote_url: Option<String>,
    pub unique_identifier: Option<UniqueIdentifier>,
    /// Named validator; `schema` unless configured.
    pub validator: String,
    pub import_allowed: bool,
    /// Other types sharing this configuration and remote table.
    pub equivalent_types: Vec<String>,
    pub parent_container: Option<ParentContainer>,
    pub auto_publish_new: bool,
    /// Entity is a content-tree resource.
    pub tree: bool,
    /// Remote column → local field.
    pub import_mapping: BTreeMap<String, String>,
    /// Remote column → local field for pushes; falls back to `import_mapping`.
    pub export_mapping: Option<BTreeMap<String, String>>,
    pub fields: Vec<FieldDef>,
}

impl Default for SyncConfiguration {
    fn default() -> Self {
        Self {
            remote_base: String::new(),
            remote_table: String::new(),
            remote_url: None,
            unique_identifier: None,
            validator: "schema".to_string(),
            import_allowed: true,
            equivalent_types: Vec::new(),
            parent_container: None,
            auto_publish_new: false,
            tree: false,
            import_mapping: BTreeMap::new(),
            export_mapping: None,
            fields: Vec::new(),
        }
    }
}

impl SyncConfiguration {
    /// Column mapping used when pushing.
    #[must_use]
    pub fn export_mapping(&self) -> &BTreeMap<String, String> {
        self.export_mapping.as_ref().unwrap_or(&self.import_mapping)
    }
}

/// Column used to match rows before an external id exists.
///
/// Either one name shared by the remote column and the local field, or a
/// single-entry `{remote_column: local_field}` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UniqueIdentifier {
    Column(String),
    Mapping(BTreeMap<String, String>),
}

/// Where new tree resources are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentContainer {
    /// Local record id.
    Id(i64),
    /// Slash-separated slug path, resolved at import time.
    Path(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_defaults() {
        let cfg: SyncConfiguration =
            serde_json::from_str(r#"{"remote_base": "app1", "remote_table": "T"}"#).unwrap();
        assert_eq!(cfg.validator, "schema");
        assert!(cfg.import_allowed);
        assert!(!cfg.auto_publish_new);
        assert!(cfg.unique_identifier.is_none());
    }

    #[test]
    fn test_unique_identifier_forms() {
        let cfg: SyncConfiguration =
            serde_json::from_str(r#"{"unique_identifier": "slug"}"#).unwrap();
        assert_eq!(
            cfg.unique_identifier,
            Some(UniqueIdentifier::Column("slug".into()))
        );

        let cfg: SyncConfiguration =
            serde_json::from_str(r#"{"unique_identifier": {"Slug": "slug"}}"#).unwrap();
        assert!(matches!(cfg.unique_identifier, Some(UniqueIdentifier::Mapping(_))));
    }

    #[test]
    fn test_parent_container_forms() {
        let id: ParentContainer = serde_json::from_str("3").unwrap();
        assert_eq!(id, ParentContainer::Id(3));
        let path: ParentContainer = serde_json::from_str(r#""home/news""#).unwrap();
        assert_eq!(path, ParentContainer::Path("home/news".into()));
    }

    #[test]
    fn test_export_mapping_falls_back() {
        let mut cfg = SyncConfiguration::default();
        cfg.import_mapping.insert("Title".into(), "title".into());
        assert_eq!(cfg.export_mapping().get("Title").map(String::as_str), Some("title"));

        let mut export = BTreeMap::new();
        export.insert("Name".into(), "title".into());
        cfg.export_mapping = Some(export);
        assert!(cfg.export_mapping().contains_key("Name"));
    }

    #[test]
    fn test_settings_push_on_save_defaults_true() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert!(settings.push_on_save);
        assert!(!settings.enabled);
    }
}
