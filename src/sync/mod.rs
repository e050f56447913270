//! Remote table synchronization.
//!
//! This module provides both directions of sync:
//!
//! - **Push**: a local save or delete is mirrored to the remote table
//! - **Import**: the remote table is reconciled into local storage
//! - **Hashing**: SHA256 content hashing to skip no-op saves
//! - **Notices**: per-record messages for the user
//!
//! # Architecture
//!
//! Every local record type implements [`Syncable`] by holding a
//! [`SyncState`]. A [`SyncEngine`] owns the type registry and the injected
//! remote connector and drives the push state machine:
//!
//! 1. the record is persisted locally
//! 2. on first use the instance is bound to its configuration and table
//! 3. an enabled instance with pushing allowed updates, matches, or creates
//!    its remote row and stores the row id
//!
//! [`BulkImporter`] runs the other way, reconciling fetched rows by
//! external id, then unique identifier, then creation.
//!
//! # Example
//!
//! ```ignore
//! use tsync::sync::{import_types, SyncEngine};
//!
//! let engine = SyncEngine::new(registry, connector)?;
//! let outcome = engine.save(&mut storage, &mut record)?;
//!
//! let stats = import_types(&mut storage, &engine, &validators, &["blog".into()])?;
//! println!("{}", stats.summary());
//! ```

mod hash;
mod import;
mod notice;
mod orchestrator;
mod push;
mod state;
mod types;

pub use hash::content_hash;
pub use import::BulkImporter;
pub use notice::{Notice, NoticeLevel};
pub use orchestrator::{import_order, import_types, reset, resolve_labels};
pub use push::{LocalStore, SyncEngine, Syncable};
pub use state::{SyncPhase, SyncState};
pub use types::{
    EntityStats, ImportStats, PushAction, PushError, PushOutcome, RowOutcome, SyncResult,
    TypeImport,
};
