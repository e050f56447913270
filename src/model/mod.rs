//! Data models for tablesync.
//!
//! - [`schema`] - field definitions per entity type
//! - [`record`] - the generic local record

pub mod record;
pub mod schema;

pub use record::{Record, TreePosition};
pub use schema::{EntitySchema, FieldDef, FieldKind};
