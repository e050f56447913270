//! Result and statistics types for push and import operations.

use std::fmt;

use serde::Serialize;

use crate::remote::{ErrorDetails, FieldMap};
use crate::validate::FieldErrors;

/// What the importer did with one remote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    Created,
    Updated,
    /// Matched, but nothing differed.
    Unchanged,
    /// Matched a locked tree resource; left alone.
    Locked,
    /// Tree resource with no resolvable parent; not created.
    NoParent,
    /// Matched nothing in a match-only pass; left for a later type.
    NotCreated,
    /// Validation or processing failed; see `errors`.
    Failed,
}

/// Outcome of processing one remote row.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub remote_record_id: String,
    /// Row fields exactly as fetched.
    pub raw_fields: FieldMap,
    /// Whether a local record was created for the row.
    pub is_new: bool,
    pub outcome: RowOutcome,
    /// Local record touched or matched, if any.
    pub local_id: Option<i64>,
    pub errors: Option<FieldErrors>,
}

impl SyncResult {
    #[must_use]
    pub fn new(remote_record_id: &str, raw_fields: FieldMap, outcome: RowOutcome) -> Self {
        Self {
            remote_record_id: remote_record_id.to_string(),
            raw_fields,
            is_new: outcome == RowOutcome::Created,
            outcome,
            local_id: None,
            errors: None,
        }
    }

    #[must_use]
    pub fn with_local_id(mut self, id: Option<i64>) -> Self {
        self.local_id = id;
        self
    }

    #[must_use]
    pub fn failed(remote_record_id: &str, raw_fields: FieldMap, errors: FieldErrors) -> Self {
        Self {
            errors: Some(errors),
            ..Self::new(remote_record_id, raw_fields, RowOutcome::Failed)
        }
    }
}

/// Per-type counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub created: usize,
    pub updated: usize,
    /// Unchanged, locked, parentless, and failed rows.
    pub skipped: usize,
}

impl EntityStats {
    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created => self.created += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Unchanged
            | RowOutcome::Locked
            | RowOutcome::NoParent
            | RowOutcome::Failed => self.skipped += 1,
            // Not consumed; the row is counted by whichever type claims it.
            RowOutcome::NotCreated => {}
        }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped
    }
}

/// Import run for one entity type.
#[derive(Debug, Clone, Serialize)]
pub struct TypeImport {
    pub entity_type: String,
    pub stats: EntityStats,
    /// Type-level failure (configuration or remote fetch) that stopped the type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub results: Vec<SyncResult>,
}

/// Aggregate of an import run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub types: Vec<TypeImport>,
}

impl ImportStats {
    #[must_use]
    pub fn total_created(&self) -> usize {
        self.types.iter().map(|t| t.stats.created).sum()
    }

    #[must_use]
    pub fn total_updated(&self) -> usize {
        self.types.iter().map(|t| t.stats.updated).sum()
    }

    #[must_use]
    pub fn total_skipped(&self) -> usize {
        self.types.iter().map(|t| t.stats.skipped).sum()
    }

    /// Types that failed before processing rows.
    pub fn failed_types(&self) -> impl Iterator<Item = &TypeImport> {
        self.types.iter().filter(|t| t.error.is_some())
    }

    /// `"<created> created. <updated> updated. <skipped> skipped."`
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} created. {} updated. {} skipped.",
            self.total_created(),
            self.total_updated(),
            self.total_skipped()
        )
    }
}

/// Remote call that failed during a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushAction {
    Create,
    Update,
    Delete,
}

impl PushAction {
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A classified push failure, kept on the instance for the caller to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushError {
    pub action: PushAction,
    pub details: ErrorDetails,
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Could not {} remote record. Reason: {}",
            self.action.as_str(),
            self.details.message
        )
    }
}

/// What a save or delete did on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PushOutcome {
    /// A new remote row was created.
    Created { remote_id: String },
    /// An existing remote row was updated (found by id or by match).
    Updated { remote_id: String },
    /// The remote row was deleted.
    Deleted { remote_id: String },
    /// The entity type is not enabled for sync.
    Disabled,
    /// Pushing was suppressed for this write.
    Suppressed,
    /// The remote call failed; the local write stands.
    Failed { error: PushError },
}

impl PushOutcome {
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Self::Created { remote_id } | Self::Updated { remote_id } | Self::Deleted { remote_id } => {
                Some(remote_id)
            }
            _ => None,
        }
    }

    /// Whether the remote side was contacted and succeeded.
    #[must_use]
    pub fn is_pushed(&self) -> bool {
        self.remote_id().is_some()
    }
}
