//! Command-line front end.
//!
//! Usage:
//!   docway update <target> <changelog> [changelogs...]
//!   docway validate <changelog> [changelogs...]
//!   docway query <target> <globalUniqueChangeId>
//!   docway rollback <target> <globalUniqueChangeId>
//!
//! `<target>` is `file://<directory>/<database>` or a bare database name
//! resolved in the working directory. A single `-` changelog reads standard
//! input. `RUST_LOG` controls verbosity (default `info`).

use std::process::ExitCode;

use clap::{Parser, Subcommand};

use docway::engine::{Engine, EngineConfig, RollbackOutcome};

#[derive(Parser)]
#[command(name = "docway")]
#[command(about = "Versioned, audited change sets for document databases", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute change sets in the change log(s) against the database.
    Update {
        /// Connection target
        target: String,
        /// Change log paths, or a single `-` for standard input
        #[arg(required = true)]
        changelogs: Vec<String>,
    },
    /// Validate change log(s) without touching a database.
    Validate {
        /// Change log paths, or a single `-` for standard input
        #[arg(required = true)]
        changelogs: Vec<String>,
    },
    /// Query a change set by globalUniqueChangeId.
    Query {
        /// Connection target
        target: String,
        /// The unique identifier of the change set
        global_unique_change_id: String,
    },
    /// Rollback change set by globalUniqueChangeId.
    Rollback {
        /// Connection target
        target: String,
        /// The unique identifier of the change set
        global_unique_change_id: String,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let engine = Engine::new(EngineConfig::from_env());

    match run(&engine, args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(engine: &Engine, command: Command) -> docway::error::Result<()> {
    match command {
        Command::Update { target, changelogs } => {
            engine.update(&target, &changelogs)?;
        }
        Command::Validate { changelogs } => {
            engine.validate(&changelogs)?;
        }
        Command::Query {
            target,
            global_unique_change_id,
        } => {
            if let Some(record) = engine.query(&target, &global_unique_change_id)? {
                let pretty = serde_json::to_string_pretty(&record)
                    .map_err(docway::persist::PersistError::Serde)?;
                println!("{pretty}");
            }
        }
        Command::Rollback {
            target,
            global_unique_change_id,
        } => {
            if let RollbackOutcome::RolledBack { original, rollback } =
                engine.rollback(&target, &global_unique_change_id)?
            {
                log::debug!("Rolled back {original} with {rollback}");
            }
        }
    }
    Ok(())
}
