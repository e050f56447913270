//! tablesync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tsync::cli::commands;
use tsync::cli::{Cli, Commands};
use tsync::config::{load_settings, resolve_config_path};
use tsync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    init_tracing(cli.verbose, cli.quiet, settings_debug(&cli));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

/// The `debug` setting raises the default level; a broken settings file is
/// reported later by the command itself.
fn settings_debug(cli: &Cli) -> bool {
    let path = resolve_config_path(cli.config.as_deref());
    load_settings(path.as_deref()).is_ok_and(|s| s.debug)
}

fn init_tracing(verbose: u8, quiet: bool, debug: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 if debug => EnvFilter::new("warn,tsync=debug"),
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<(), Error> {
    let json = cli.json;
    let config = cli.config.as_ref();
    let db = cli.db.as_ref();
    let actor = cli.actor.as_deref();

    match &cli.command {
        Commands::Init { force } => commands::init::execute(config, db, *force, json),
        Commands::Version => commands::version::execute(json),

        Commands::Import { types } => commands::import::execute(config, db, actor, types, json),
        Commands::Reset => commands::reset::execute(config, db, actor, json),
        Commands::Status => commands::status::execute(config, db, json),

        Commands::Record { command } => commands::record::execute(command, config, db, actor, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
