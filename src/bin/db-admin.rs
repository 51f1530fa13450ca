//! # Database Administration
//!
//! Operator entry point for schema maintenance on the meeting store. Reads
//! the same `DB_*` environment variables as the services.
//!
//! `recreate` is the only way to reach the destructive schema rebuild; it
//! refuses to run unless `--confirm` names the configured database.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use shared_models::database::{Database, MigrationLedger, RecreateIntent};
use shared_models::logging::init_logging;
use shared_models::SCHEMA;
use std::process;
use tracing::{error, info, warn};

/// Keyword accepted wherever a revision is expected, meaning "nothing applied".
const BASE: &str = "base";

#[derive(Parser)]
#[command(name = "db-admin")]
#[command(about = "Provision, migrate and inspect the meeting store schema")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create any missing tables, constraints and indexes
    Init {
        /// Also record the head revision as applied
        #[arg(long)]
        stamp: bool,
    },

    /// Drop the whole schema and rebuild it empty. ALL DATA IS LOST.
    Recreate {
        /// Name of the database to wipe; must match DB_NAME
        #[arg(long)]
        confirm: String,
    },

    /// Apply revisions up to a target (default: head)
    Upgrade {
        #[arg(long)]
        to: Option<String>,
    },

    /// Undo revisions down to a target revision, or "base" for everything
    Downgrade {
        #[arg(long)]
        to: String,
    },

    /// Record a revision as applied without running it ("base" clears it)
    Stamp { revision: String },

    /// Show the recorded revision and pending steps
    Current,

    /// List the revision chain
    History,

    /// Compare the live schema with the table definitions
    Check,
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let db = Database::from_env();

    let result = run(&cli, &db).await;
    db.close().await;

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("db-admin failed: {e:#}");
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli, db: &Database) -> Result<()> {
    match &cli.command {
        Commands::Init { stamp } => {
            db.init_schema().await.context("schema initialization failed")?;
            if *stamp {
                let head = MigrationLedger::standard()?.head();
                db.stamp(head).await.context("stamping head revision failed")?;
            }
            println!("Schema initialized");
        }
        Commands::Recreate { confirm } => {
            let config = db.config().await?;
            if confirm != &config.database {
                bail!(
                    "--confirm '{}' does not match DB_NAME '{}'; nothing was changed",
                    confirm,
                    config.database
                );
            }
            warn!(database = %config.database, "Operator requested schema recreation");
            db.recreate_schema(&RecreateIntent::confirm(confirm.as_str()))
                .await
                .context("schema recreation failed")?;
            println!("Schema recreated on {}", config.database);
        }
        Commands::Upgrade { to } => {
            let applied = db.upgrade(revision_arg(to.as_deref())).await?;
            info!(count = applied.len(), "Upgrade finished");
            print(cli.format, &applied, || {
                if applied.is_empty() {
                    println!("Already at target revision");
                }
                for revision in &applied {
                    println!("applied  {revision}");
                }
            })?;
        }
        Commands::Downgrade { to } => {
            let reverted = db.downgrade(revision_arg(Some(to))).await?;
            info!(count = reverted.len(), "Downgrade finished");
            print(cli.format, &reverted, || {
                if reverted.is_empty() {
                    println!("Already at target revision");
                }
                for revision in &reverted {
                    println!("reverted {revision}");
                }
            })?;
        }
        Commands::Stamp { revision } => {
            db.stamp(revision_arg(Some(revision))).await?;
            println!("Stamped {revision}");
        }
        Commands::Current => {
            let status = db.migration_status().await?;
            print(cli.format, &status, || {
                println!("current: {}", status.current.as_deref().unwrap_or(BASE));
                println!("head:    {}", status.head.unwrap_or(BASE));
                for revision in &status.pending {
                    println!("pending: {revision}");
                }
            })?;
        }
        Commands::History => {
            let history = MigrationLedger::standard()?.history();
            print(cli.format, &history, || {
                for info in &history {
                    println!(
                        "{} -> {}  {}{}",
                        info.down_revision.unwrap_or(BASE),
                        info.revision,
                        info.description,
                        if info.reversible { "" } else { " (irreversible)" }
                    );
                }
            })?;
        }
        Commands::Check => {
            let snapshot = db.snapshot().await?;
            let drift = snapshot.drift_from(&SCHEMA);
            print(cli.format, &drift, || {
                for line in &drift {
                    println!("{line}");
                }
            })?;
            if !drift.is_empty() {
                bail!("live schema differs from the table definitions in {} place(s)", drift.len());
            }
            if cli.format == OutputFormat::Table {
                println!("Schema matches");
            }
        }
    }
    Ok(())
}

/// `None` and "base" both mean the empty chain position.
fn revision_arg(arg: Option<&str>) -> Option<&str> {
    arg.filter(|rev| !rev.eq_ignore_ascii_case(BASE))
}

fn print<T: Serialize>(format: OutputFormat, value: &T, table: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table => table(),
    }
    Ok(())
}
