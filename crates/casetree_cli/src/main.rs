//! Read-only inspector for case directories.
//!
//! # Responsibility
//! - Open an existing case and print its tree, attributes, audit log or
//!   evidence counts.
//! - Keep output deterministic for quick local sanity checks.
//!
//! # Invariants
//! - Never creates a case: the directory must already hold a case database.

use casetree_core::{init_case_logging, Case, CaseConfig, Item, ItemUid, NoopPublisher};
use clap::{Parser, Subcommand};
use log::warn;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "casetree", about = "Inspect a forensic case directory", version)]
struct Cli {
    /// Case directory holding the case database
    case_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the item tree (default)
    Tree,
    /// Print the attributes of one item
    Attrs {
        /// Item uid
        uid: ItemUid,
    },
    /// Print the audit log of one item
    Events {
        /// Item uid
        uid: ItemUid,
    },
    /// Print evidence counts per kind of one item
    Evidence {
        /// Item uid
        uid: ItemUid,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = CaseConfig::default();
    ensure_case_dir(&cli.case_dir, &config)?;

    if let Err(err) = init_case_logging(&cli.case_dir) {
        // Inspection still works without a log file.
        eprintln!("logging disabled: {err}");
    }

    let case = Case::open(&cli.case_dir, config, Arc::new(NoopPublisher))
        .map_err(|err| format!("cannot open case `{}`: {err}", cli.case_dir.display()))?;

    match cli.command.unwrap_or(Command::Tree) {
        Command::Tree => print_tree(&case.root_item(), 0),
        Command::Attrs { uid } => {
            let item = find_item(&case, uid)?;
            let attributes = item.get_attributes().map_err(|err| err.to_string())?;
            for (id, value) in attributes {
                println!("{id} = {value}");
            }
            Ok(())
        }
        Command::Events { uid } => {
            let item = find_item(&case, uid)?;
            for event in item.get_events().map_err(|err| err.to_string())? {
                println!("{} {}", event.timestamp, event.text);
            }
            Ok(())
        }
        Command::Evidence { uid } => {
            let item = find_item(&case, uid)?;
            let counts = item.count_all_evidences().map_err(|err| err.to_string())?;
            for (kind, count) in counts {
                println!("{kind} {count}");
            }
            Ok(())
        }
    }
}

/// Fails unless `case_dir` already holds a case database, so a mistyped
/// path is reported instead of silently becoming a new empty case.
fn ensure_case_dir(case_dir: &Path, config: &CaseConfig) -> Result<(), String> {
    let db_path = case_dir.join(&config.db_file_name);
    if db_path.is_file() {
        return Ok(());
    }
    Err(format!(
        "not a case directory: `{}` (missing {})",
        case_dir.display(),
        config.db_file_name
    ))
}

fn find_item(case: &Case, uid: i64) -> Result<Item, String> {
    case.get_item(uid)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("item not found: {uid}"))
}

fn print_tree(item: &Item, depth: usize) -> Result<(), String> {
    let record = item.record().map_err(|err| err.to_string())?;
    println!(
        "{}{} [{}] uid={}",
        "  ".repeat(depth),
        record.idx,
        record.category,
        record.uid
    );
    let children = item.get_children().map_err(|err| {
        warn!("event=cli_tree module=cli status=error uid={}", record.uid);
        err.to_string()
    })?;
    for child in &children {
        print_tree(child, depth + 1)?;
    }
    Ok(())
}
