//! SQLite storage layer for tablesync.
//!
//! This module provides the local persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Savepoint discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod schema;
pub mod sqlite;

pub use sqlite::{MutationContext, Revision, SqliteStorage};
