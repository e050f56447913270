//! Translation between remote column names and local field names.
//!
//! Every function here is pure. Unknown columns are dropped, never errors.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::config::UniqueIdentifier;
use crate::remote::{value_to_search_text, FieldMap};

/// Keys a local store assigns itself; never taken from remote data.
const PRIMARY_KEY_FIELDS: [&str; 2] = ["pk", "id"];

/// Map remote columns to local fields.
///
/// Only columns named in `mapping` survive, renamed to their local field.
#[must_use]
pub fn map_import(remote_fields: &FieldMap, mapping: &BTreeMap<String, String>) -> FieldMap {
    remote_fields
        .iter()
        .filter_map(|(column, value)| {
            mapping
                .get(column)
                .map(|field| (field.clone(), value.clone()))
        })
        .collect()
}

/// Build the remote column map for a push from local field values.
///
/// Fields with no local value are sent as JSON null so the remote cell is
/// cleared.
#[must_use]
pub fn map_export(
    mapping: &BTreeMap<String, String>,
    value_of: impl Fn(&str) -> Option<Value>,
) -> FieldMap {
    mapping
        .iter()
        .map(|(column, field)| (column.clone(), value_of(field).unwrap_or(Value::Null)))
        .collect()
}

/// Resolve a unique-identifier setting into `(remote_column, local_field)`.
///
/// A bare name is used for both sides. A map must hold exactly one entry;
/// empty or multi-entry maps and blank names resolve to `None`.
#[must_use]
pub fn resolve_unique_identifier(identifier: Option<&UniqueIdentifier>) -> Option<(String, String)> {
    match identifier? {
        UniqueIdentifier::Column(name) if !name.trim().is_empty() => {
            Some((name.clone(), name.clone()))
        }
        UniqueIdentifier::Mapping(map) if map.len() == 1 => {
            let (column, field) = map.iter().next()?;
            if column.trim().is_empty() || field.trim().is_empty() {
                None
            } else {
                Some((column.clone(), field.clone()))
            }
        }
        _ => None,
    }
}

/// Text value of the unique-identifier column in a remote row.
///
/// Missing, null, and empty cells yield `None`; they cannot match anything.
#[must_use]
pub fn unique_value(remote_fields: &FieldMap, column: &str) -> Option<String> {
    remote_fields
        .get(column)
        .map(value_to_search_text)
        .filter(|v| !v.is_empty())
}

/// Drop primary-key-like keys from an imported payload.
#[must_use]
pub fn strip_primary_keys(mut fields: FieldMap) -> FieldMap {
    for key in PRIMARY_KEY_FIELDS {
        fields.remove(key);
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(c, f)| ((*c).to_string(), (*f).to_string()))
            .collect()
    }

    fn fields(value: Value) -> FieldMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_map_import_drops_unmapped_columns() {
        let remote = fields(json!({"A": "x", "B": "y", "C": "z"}));
        let mapped = map_import(&remote, &mapping(&[("A", "a"), ("B", "b")]));
        assert_eq!(mapped, fields(json!({"a": "x", "b": "y"})));
    }

    #[test]
    fn test_map_import_missing_columns_are_absent() {
        let remote = fields(json!({"A": "x"}));
        let mapped = map_import(&remote, &mapping(&[("A", "a"), ("B", "b")]));
        assert_eq!(mapped.len(), 1);
        assert!(!mapped.contains_key("b"));
    }

    #[test]
    fn test_map_export_nulls_missing() {
        let out = map_export(&mapping(&[("Title", "title"), ("Slug", "slug")]), |f| {
            (f == "title").then(|| json!("Hello"))
        });
        assert_eq!(out, fields(json!({"Title": "Hello", "Slug": null})));
    }

    #[test]
    fn test_resolve_unique_identifier() {
        assert_eq!(
            resolve_unique_identifier(Some(&UniqueIdentifier::Column("slug".into()))),
            Some(("slug".to_string(), "slug".to_string()))
        );
        let single = UniqueIdentifier::Mapping(mapping(&[("Slug", "slug")]));
        assert_eq!(
            resolve_unique_identifier(Some(&single)),
            Some(("Slug".to_string(), "slug".to_string()))
        );
    }

    #[test]
    fn test_resolve_unique_identifier_invalid() {
        assert_eq!(resolve_unique_identifier(None), None);
        assert_eq!(
            resolve_unique_identifier(Some(&UniqueIdentifier::Column(" ".into()))),
            None
        );
        let empty = UniqueIdentifier::Mapping(BTreeMap::new());
        assert_eq!(resolve_unique_identifier(Some(&empty)), None);
        let multi = UniqueIdentifier::Mapping(mapping(&[("A", "a"), ("B", "b")]));
        assert_eq!(resolve_unique_identifier(Some(&multi)), None);
    }

    #[test]
    fn test_unique_value() {
        let remote = fields(json!({"Slug": "a", "Empty": "", "Num": 7, "Null": null}));
        assert_eq!(unique_value(&remote, "Slug").as_deref(), Some("a"));
        assert_eq!(unique_value(&remote, "Num").as_deref(), Some("7"));
        assert_eq!(unique_value(&remote, "Empty"), None);
        assert_eq!(unique_value(&remote, "Null"), None);
        assert_eq!(unique_value(&remote, "Missing"), None);
    }

    #[test]
    fn test_strip_primary_keys() {
        let stripped = strip_primary_keys(fields(json!({"id": 4, "pk": 4, "title": "A"})));
        assert_eq!(stripped, fields(json!({"title": "A"})));
    }
}
