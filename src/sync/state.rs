//! Per-instance sync state held by every syncable entity.

use std::fmt;
use std::sync::Arc;

use crate::config::SyncConfiguration;
use crate::remote::{FieldMap, RemoteTableClient};
use crate::sync::types::PushError;

/// Lifecycle of an instance's remote binding.
///
/// `Uninitialized` until the first setup; setup passes through
/// `Configured` once a configuration is found and lands in `Enabled` or
/// `Disabled`. Setup never runs twice for one instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Configured,
    Enabled,
    Disabled,
}

impl SyncPhase {
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// Remote identity and push state of one local record.
#[derive(Clone)]
pub struct SyncState {
    /// Remote row id; empty until the first successful sync.
    pub external_record_id: String,
    /// Caller-controlled switch; false suppresses pushes for this instance.
    pub push_to_remote: bool,
    phase: SyncPhase,
    config: Option<Arc<SyncConfiguration>>,
    client: Option<Arc<dyn RemoteTableClient>>,
    export_cache: Option<FieldMap>,
    last_sync_error: Option<PushError>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl SyncState {
    #[must_use]
    pub fn new(external_record_id: String) -> Self {
        Self {
            external_record_id,
            push_to_remote: true,
            phase: SyncPhase::Uninitialized,
            config: None,
            client: None,
            export_cache: None,
            last_sync_error: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.phase == SyncPhase::Enabled
    }

    #[must_use]
    pub fn config(&self) -> Option<&Arc<SyncConfiguration>> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn client(&self) -> Option<&Arc<dyn RemoteTableClient>> {
        self.client.as_ref()
    }

    pub(crate) fn configure(&mut self, config: Arc<SyncConfiguration>) {
        self.config = Some(config);
        self.phase = SyncPhase::Configured;
    }

    pub(crate) fn enable(&mut self, client: Arc<dyn RemoteTableClient>) {
        self.client = Some(client);
        self.phase = SyncPhase::Enabled;
    }

    pub(crate) fn disable(&mut self) {
        self.client = None;
        self.phase = SyncPhase::Disabled;
    }

    /// Export fields, computed on first use and memoized until invalidated.
    pub fn export_fields_with(&mut self, compute: impl FnOnce() -> FieldMap) -> &FieldMap {
        self.export_cache.get_or_insert_with(compute)
    }

    pub fn invalidate_export_cache(&mut self) {
        self.export_cache = None;
    }

    #[must_use]
    pub fn has_cached_export(&self) -> bool {
        self.export_cache.is_some()
    }

    /// Failure of the most recent push, if it failed.
    #[must_use]
    pub fn last_sync_error(&self) -> Option<&PushError> {
        self.last_sync_error.as_ref()
    }

    pub(crate) fn set_last_sync_error(&mut self, error: Option<PushError>) {
        self.last_sync_error = error;
    }

    pub fn take_last_sync_error(&mut self) -> Option<PushError> {
        self.last_sync_error.take()
    }
}

impl fmt::Debug for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncState")
            .field("external_record_id", &self.external_record_id)
            .field("push_to_remote", &self.push_to_remote)
            .field("phase", &self.phase)
            .field("client", &self.client.as_ref().map(|c| c.table_key()))
            .field("export_cached", &self.export_cache.is_some())
            .field("last_sync_error", &self.last_sync_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_pushes_by_default() {
        let state = SyncState::default();
        assert!(state.push_to_remote);
        assert_eq!(state.phase(), SyncPhase::Uninitialized);
        assert!(state.external_record_id.is_empty());
    }

    #[test]
    fn test_export_cache_memoizes_until_invalidated() {
        let mut state = SyncState::default();
        let mut calls = 0;
        state.export_fields_with(|| {
            calls += 1;
            json!({"A": 1}).as_object().cloned().unwrap()
        });
        state.export_fields_with(|| {
            calls += 1;
            FieldMap::new()
        });
        assert_eq!(calls, 1);
        assert!(state.has_cached_export());

        state.invalidate_export_cache();
        let fields = state.export_fields_with(FieldMap::new).clone();
        assert!(fields.is_empty());
    }
}
