//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// tablesync CLI - two-way sync between local records and a remote table
#[derive(Parser, Debug)]
#[command(name = "tsync", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: ./tablesync.json, then ~/.tablesync/config.json)
    #[arg(long, global = true, env = "TSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database path (default: ~/.tablesync/data/tablesync.db)
    #[arg(long, global = true, env = "TSYNC_DB")]
    pub db: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "TSYNC_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a sample settings file and create the database
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Import records from the remote table
    Import {
        /// Entity types (`app.Model`) or app labels (`app`)
        #[arg(required = true, num_args = 1..)]
        types: Vec<String>,
    },

    /// Clear the external record id of every configured type
    Reset,

    /// Show configured types and their sync state
    Status,

    /// Local record operations (pushes to the remote table on save)
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Record Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum RecordCommands {
    /// Create or update a record, then push it
    Save(RecordSaveArgs),

    /// Delete a record locally and remotely
    Delete {
        /// Entity type (`app.Model`)
        entity_type: String,

        /// Local record id
        id: i64,

        /// Delete locally only
        #[arg(long)]
        no_push: bool,
    },

    /// Show one record
    Show {
        /// Entity type (`app.Model`)
        entity_type: String,

        /// Local record id
        id: i64,
    },

    /// List records of one type
    List {
        /// Entity type (`app.Model`)
        entity_type: String,
    },
}

#[derive(Args, Debug)]
pub struct RecordSaveArgs {
    /// Entity type (`app.Model`)
    pub entity_type: String,

    /// Update this local record instead of creating one
    #[arg(long)]
    pub id: Option<i64>,

    /// Field assignment (repeatable); values parse as JSON, else text
    #[arg(long = "set", value_name = "FIELD=VALUE")]
    pub set: Vec<String>,

    /// Save locally without pushing
    #[arg(long)]
    pub no_push: bool,
}
