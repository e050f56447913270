//! tablesync CLI - two-way sync between local records and a remote table
//!
//! This crate provides the core functionality for the `tsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Settings file, environment overrides, type registry
//! - [`model`] - Local records and per-type field schemas
//! - [`mapping`] - Remote column / local field translation
//! - [`validate`] - Record validators
//! - [`remote`] - Remote table clients (HTTP and in-memory)
//! - [`storage`] - SQLite database layer
//! - [`sync`] - Push state machine and bulk import
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::cell::Cell;

pub mod cli;
pub mod config;
pub mod error;
pub mod mapping;
pub mod model;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};

thread_local! {
    /// Push suspension flag.
    ///
    /// When set, saves and deletes never reach the remote table. The engine
    /// is single-threaded, so the flag lives with the thread that runs it.
    static PUSH_SUSPENDED: Cell<bool> = const { Cell::new(false) };
}

/// Check if outgoing pushes are suspended.
#[inline]
pub fn is_push_suspended() -> bool {
    PUSH_SUSPENDED.with(Cell::get)
}

/// Suspends outgoing pushes until dropped.
///
/// Guards nest: dropping one restores whatever was in effect before it.
#[derive(Debug)]
#[must_use = "pushes resume as soon as the guard is dropped"]
pub struct PushSuspension {
    previous: bool,
}

impl PushSuspension {
    pub fn new() -> Self {
        Self {
            previous: PUSH_SUSPENDED.with(|flag| flag.replace(true)),
        }
    }
}

impl Default for PushSuspension {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PushSuspension {
    fn drop(&mut self) {
        PUSH_SUSPENDED.with(|flag| flag.set(self.previous));
    }
}
