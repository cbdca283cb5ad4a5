//! pagedb CLI - inspect and manage a pagedb database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use pagedb::database::Database;
use pagedb::storage::StorageError;

/// pagedb - page store with a checksummed write-ahead log
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base path of the database (creates/opens <path>.db and <path>.log)
    #[arg(short = 'D', long)]
    path: PathBuf,

    /// Page-cache memory budget in bytes
    #[arg(short, long, default_value = "8000000")]
    memory: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new database
    Create,
    /// Show page count and clean-shutdown state
    Info,
    /// List write-ahead log records in order
    WalDump,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Unrecoverable on-disk corruption aborts rather than limping on.
            match e.downcast_ref::<StorageError>() {
                Some(se) if se.is_unrecoverable() => {
                    log::error!("unrecoverable storage error, aborting: {e:#}");
                }
                _ => log::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    match args.command {
        Command::Create => {
            let db = Database::create(&args.path, args.memory)
                .with_context(|| format!("failed to create database at {:?}", args.path))?;
            db.close()?;
            println!("created database at {}", args.path.display());
        }
        Command::Info => {
            let db = Database::open(&args.path, args.memory)
                .with_context(|| format!("failed to open database at {:?}", args.path))?;
            println!("pages:          {}", db.pager().page_count());
            println!(
                "last shutdown:  {}",
                if db.last_session_clean() {
                    "clean"
                } else {
                    "crashed"
                }
            );
            println!("log bytes:      {}", db.wal().len());
            db.close()?;
        }
        Command::WalDump => {
            let db = Database::open(&args.path, args.memory)
                .with_context(|| format!("failed to open database at {:?}", args.path))?;
            db.wal().rewind();
            let mut i = 0usize;
            while let Some(record) = db.wal().next()? {
                println!("record {:>6}: {} bytes", i, record.len());
                i += 1;
            }
            println!("{i} records");
            db.close()?;
        }
    }
    Ok(())
}
