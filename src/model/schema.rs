//! Field definitions for configured entity types.

use serde::{Deserialize, Serialize};

/// Storage/validation kind of a local field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Slug,
    Url,
    Integer,
    Float,
    Boolean,
    /// Free-form labels, auto-created on import.
    Tags,
    /// References to related objects by label.
    ManyToMany,
}

impl FieldKind {
    /// Whether values of this kind live in the relation table.
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Tags | Self::ManyToMany)
    }

    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Slug => "slug",
            Self::Url => "url",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Tags => "tags",
            Self::ManyToMany => "many_to_many",
        }
    }
}

/// One local field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Kind of related object for `tags` / `many_to_many` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<String>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            max_length: None,
            related: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    /// Related-object kind; tags default to `tag`, other relations to the field name.
    #[must_use]
    pub fn related_kind(&self) -> &str {
        match (&self.related, self.kind) {
            (Some(kind), _) => kind,
            (None, FieldKind::Tags) => "tag",
            (None, _) => &self.name,
        }
    }
}

/// Field layout of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySchema {
    pub entity_type: String,
    pub fields: Vec<FieldDef>,
    /// Entity is a content-tree resource (parent, lock, revisions).
    pub tree: bool,
}

impl EntitySchema {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn is_multi(&self, name: &str) -> bool {
        self.field(name).is_some_and(|f| f.kind.is_multi())
    }
}
