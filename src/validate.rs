//! Validation of mapped field dictionaries.
//!
//! A [`RecordValidator`] checks and cleans the local-field map produced by
//! the field mapper before it touches a record. Validators are looked up by
//! name from a [`ValidatorSet`]; each entity type names one in its
//! configuration (`schema` by default).
//!
//! The remote side writes the literal string `"None"` for empty cells, so
//! every validator treats it as an empty string.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::model::{EntitySchema, FieldDef, FieldKind};
use crate::remote::FieldMap;

/// Field-level error messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Key used for failures that are not tied to a field.
    pub const EXCEPTION: &'static str = "exception";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Single unexpected failure.
    #[must_use]
    pub fn exception(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(Self::EXCEPTION, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| {
                let joined = messages
                    .iter()
                    .map(|m| m.trim_end_matches('.'))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{field}: {joined}.")
            })
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Resolves labels of related objects (tags, relation targets) to ids.
pub trait RelatedObjects {
    /// Return the id of the `kind` object called `label`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup or insert fails.
    fn get_or_create(&mut self, kind: &str, label: &str) -> crate::Result<i64>;
}

/// Checks and cleans a mapped field dictionary for one entity type.
pub trait RecordValidator: Send + Sync {
    fn name(&self) -> &str;

    /// Return the cleaned fields, or every problem found.
    ///
    /// # Errors
    ///
    /// Returns [`FieldErrors`] describing each invalid field.
    fn validate(
        &self,
        schema: &EntitySchema,
        fields: &FieldMap,
        related: &mut dyn RelatedObjects,
    ) -> Result<FieldMap, FieldErrors>;
}

/// Validator driven by the configured field definitions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl RecordValidator for SchemaValidator {
    fn name(&self) -> &str {
        "schema"
    }

    fn validate(
        &self,
        schema: &EntitySchema,
        fields: &FieldMap,
        related: &mut dyn RelatedObjects,
    ) -> Result<FieldMap, FieldErrors> {
        let mut cleaned = FieldMap::new();
        let mut errors = FieldErrors::new();

        for (name, raw) in fields {
            let value = normalize_none(raw);
            let Some(def) = schema.field(name) else {
                if schema.fields.is_empty() {
                    cleaned.insert(name.clone(), value);
                }
                continue;
            };

            match clean_field(def, &value, related) {
                Ok(v) => {
                    cleaned.insert(name.clone(), v);
                }
                Err(message) => errors.add(name, message),
            }
        }

        for def in schema.fields.iter().filter(|d| d.required) {
            if errors.get(&def.name).is_some() {
                continue;
            }
            if cleaned.get(&def.name).is_none_or(is_blank) {
                errors.add(&def.name, "This field is required.");
            }
        }

        if errors.is_empty() {
            Ok(cleaned)
        } else {
            Err(errors)
        }
    }
}

/// Validator that only applies the `"None"` normalization.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughValidator;

impl RecordValidator for PassthroughValidator {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn validate(
        &self,
        _schema: &EntitySchema,
        fields: &FieldMap,
        _related: &mut dyn RelatedObjects,
    ) -> Result<FieldMap, FieldErrors> {
        Ok(fields
            .iter()
            .map(|(k, v)| (k.clone(), normalize_none(v)))
            .collect())
    }
}

/// Named validators available to entity types.
#[derive(Clone)]
pub struct ValidatorSet {
    validators: HashMap<String, Arc<dyn RecordValidator>>,
}

impl ValidatorSet {
    /// An empty set.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    pub fn register(&mut self, validator: Arc<dyn RecordValidator>) {
        self.validators
            .insert(validator.name().to_string(), validator);
    }

    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn RecordValidator>> {
        self.validators.get(name).cloned()
    }
}

impl Default for ValidatorSet {
    /// `schema` and `passthrough`.
    fn default() -> Self {
        let mut set = Self::empty();
        set.register(Arc::new(SchemaValidator));
        set.register(Arc::new(PassthroughValidator));
        set
    }
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.validators.keys().collect();
        names.sort();
        f.debug_struct("ValidatorSet").field("validators", &names).finish()
    }
}

// ── Cleaning ─────────────────────────────────────────────────

fn normalize_none(value: &Value) -> Value {
    match value {
        Value::String(s) if s == "None" => Value::String(String::new()),
        other => other.clone(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn clean_field(
    def: &FieldDef,
    value: &Value,
    related: &mut dyn RelatedObjects,
) -> Result<Value, String> {
    match def.kind {
        FieldKind::Text => clean_text(def, value),
        FieldKind::Slug => {
            let text = clean_text(def, value)?;
            match text.as_str() {
                Some(s) if !s.is_empty() && !is_valid_slug(s) => Err(
                    "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens."
                        .to_string(),
                ),
                _ => Ok(text),
            }
        }
        FieldKind::Url => {
            let text = clean_text(def, value)?;
            match text.as_str() {
                Some(s) if !s.is_empty() && !is_valid_url(s) => {
                    Err("Enter a valid URL.".to_string())
                }
                _ => Ok(text),
            }
        }
        FieldKind::Integer => clean_integer(value),
        FieldKind::Float => clean_float(value),
        FieldKind::Boolean => clean_boolean(value),
        FieldKind::Tags | FieldKind::ManyToMany => clean_labels(def, value, related),
    }
}

fn clean_text(def: &FieldDef, value: &Value) -> Result<Value, String> {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Err("Not a valid string.".to_string()),
    };
    if let Some(max) = def.max_length {
        if text.chars().count() > max {
            return Err(format!(
                "Ensure this field has no more than {max} characters."
            ));
        }
    }
    Ok(Value::String(text))
}

fn clean_integer(value: &Value) -> Result<Value, String> {
    const MESSAGE: &str = "A valid integer is required.";
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| MESSAGE.to_string()),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Value::from(i)),
            #[allow(clippy::cast_possible_truncation)]
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(Value::from(f as i64)),
            _ => Err(MESSAGE.to_string()),
        },
        _ => Err(MESSAGE.to_string()),
    }
}

fn clean_float(value: &Value) -> Result<Value, String> {
    const MESSAGE: &str = "A valid number is required.";
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| MESSAGE.to_string()),
        Value::Number(n) => Ok(Value::Number(n.clone())),
        _ => Err(MESSAGE.to_string()),
    }
}

fn clean_boolean(value: &Value) -> Result<Value, String> {
    match value {
        Value::Null => Ok(Value::Bool(false)),
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            "true" | "1" | "yes" | "on" | "checked" => Ok(Value::Bool(true)),
            _ => Err("Must be a valid boolean.".to_string()),
        },
        _ => Err("Must be a valid boolean.".to_string()),
    }
}

/// Tag and relation cells arrive as a list of labels, a list of objects with
/// a `name` or `title`, or one comma-separated string.
fn clean_labels(
    def: &FieldDef,
    value: &Value,
    related: &mut dyn RelatedObjects,
) -> Result<Value, String> {
    let raw: Vec<String> = match value {
        Value::Null => Vec::new(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Object(obj) => obj
                    .get("name")
                    .or_else(|| obj.get("title"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| "Expected a name or title for each item.".to_string()),
                _ => Err("Expected a list of items.".to_string()),
            })
            .collect::<Result<_, _>>()?,
        _ => return Err("Expected a list of items.".to_string()),
    };

    let labels: BTreeSet<String> = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "None")
        .map(str::to_string)
        .collect();

    for label in &labels {
        related
            .get_or_create(def.related_kind(), label)
            .map_err(|e| format!("Could not resolve \"{label}\": {e}"))?;
    }

    Ok(Value::Array(labels.into_iter().map(Value::String).collect()))
}

fn is_valid_slug(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_valid_url(s: &str) -> bool {
    reqwest::Url::parse(s).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Known type labels close to `searched` (case-insensitive).
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
#[must_use]
pub fn find_similar_labels(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let searched = searched.to_lowercase();
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|label| (levenshtein_distance(&searched, &label.to_lowercase()), label.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, label)| label.to_string())
        .collect()
}
