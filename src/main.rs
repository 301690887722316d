//! Sqlbridge CLI Entry Point
//!
//! This is the main binary entry point for the Sqlbridge CLI.
//! It provides the operational surface over the library:
//! - `list` - identifier patterns of all configured databases
//! - `drivers` - registered driver names
//! - `query` / `update` / `delete` - statement execution against a logical database
//! - `proc` - stored procedure execution with positional variables
//!
//! All output to stdout is JSON-only. Logs go to stderr.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use sqlbridge::{
    Bridge, BridgeError, ErrorEnvelope, Metadata, QueryResult, ResolvedDatabase, SuccessEnvelope,
};

/// Sqlbridge - Configuration-Driven SQL Bridge
#[derive(Parser)]
#[command(name = "sqlbridge")]
#[command(about = "Configuration-driven SQL bridge routing logical database names to pluggable drivers")]
#[command(version)]
struct Cli {
    /// Directory containing per-database YAML configuration documents
    /// (default: $SQLBRIDGE_CONFIG_DIR, then the user config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the identifier patterns of all configured databases
    List,

    /// List the registered driver names
    Drivers,

    /// Execute a SQL statement against a logical database
    Query {
        /// Logical database name to resolve
        #[arg(long)]
        database: String,

        /// SQL statement to execute
        #[arg(long, required_unless_present = "template", conflicts_with = "template")]
        sql: Option<String>,

        /// Run a named query template from the configuration instead
        #[arg(long)]
        template: Option<String>,
    },

    /// Execute an update statement against a logical database
    Update {
        #[arg(long)]
        database: String,

        #[arg(long)]
        sql: String,
    },

    /// Execute a delete statement against a logical database
    Delete {
        #[arg(long)]
        database: String,

        #[arg(long)]
        sql: String,
    },

    /// Execute a stored procedure with positional variables
    Proc {
        #[arg(long)]
        database: String,

        /// Stored procedure name
        #[arg(long)]
        name: String,

        /// Positional variable (JSON scalar; bare words are taken as strings).
        /// Repeat for multiple variables.
        #[arg(long = "arg")]
        args: Vec<String>,
    },
}

impl Commands {
    /// Command label used in output envelopes
    const fn label(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Drivers => "drivers",
            Self::Query { .. } => "query",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Proc { .. } => "proc",
        }
    }

    /// Logical database name this command targets, if any
    fn database(&self) -> &str {
        match self {
            Self::List | Self::Drivers => "",
            Self::Query { database, .. }
            | Self::Update { database, .. }
            | Self::Delete { database, .. }
            | Self::Proc { database, .. } => database,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs to stderr; stdout carries envelopes only
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = cli.command.label();
    let database = cli.command.database().to_string();

    // The drivers listing needs no configuration directory
    if matches!(cli.command, Commands::Drivers) {
        let start = Instant::now();
        let names = sqlbridge::default_registry().driver_names();
        emit(&SuccessEnvelope::new(
            "",
            command,
            serde_json::json!({ "drivers": names }),
            Metadata::new(elapsed_ms(start)),
        ));
        return Ok(());
    }

    let directory = resolve_config_dir(cli.config_dir.clone())?;

    match execute(cli, &directory).await {
        Ok(()) => Ok(()),
        Err(err) => {
            emit(&ErrorEnvelope::from_error(database, command, &err));
            std::process::exit(1);
        }
    }
}

/// Run one command against the configuration directory
async fn execute(cli: Cli, directory: &Path) -> Result<(), BridgeError> {
    let start = Instant::now();
    let bridge = Bridge::open(directory)?;
    let registry = bridge.snapshot();

    match cli.command {
        Commands::Drivers => Ok(()), // handled before the registry load

        Commands::List => {
            let databases: Vec<&str> = registry.identifiers();
            emit(&SuccessEnvelope::new(
                "",
                "list",
                serde_json::json!({ "databases": databases }),
                Metadata::new(elapsed_ms(start)),
            ));
            Ok(())
        }

        Commands::Query { database, sql, template } => {
            let db = registry.resolve(&database)?;
            let sql = statement_for(&db, sql, template)?;
            let result = db.run_query(&sql).await?;
            emit_result(&database, "query", result, start);
            Ok(())
        }

        Commands::Update { database, sql } => {
            let db = registry.resolve(&database)?;
            let result = db.run_update(&sql).await?;
            emit_result(&database, "update", result, start);
            Ok(())
        }

        Commands::Delete { database, sql } => {
            let db = registry.resolve(&database)?;
            let result = db.run_delete(&sql).await?;
            emit_result(&database, "delete", result, start);
            Ok(())
        }

        Commands::Proc { database, name, args } => {
            let db = registry.resolve(&database)?;
            let variables: Vec<serde_json::Value> = args.iter().map(|raw| parse_variable(raw)).collect();
            let result = db.run_stored_proc(&name, &variables).await?;
            emit_result(&database, "proc", result, start);
            Ok(())
        }
    }
}

/// Pick the statement to execute: an explicit `--sql`, or a named template
/// from the configuration's extra fields
fn statement_for(
    db: &ResolvedDatabase<'_>,
    sql: Option<String>,
    template: Option<String>,
) -> Result<String, BridgeError> {
    match (sql, template) {
        (Some(sql), _) => Ok(sql),
        (None, Some(key)) => {
            let value = db.field(&key)?;
            value
                .as_str()
                .map(ToString::to_string)
                .ok_or_else(|| {
                    BridgeError::invalid_input(format!("field '{key}' is not a string template"))
                })
        }
        (None, None) => Err(BridgeError::invalid_input("either --sql or --template is required")),
    }
}

/// Parse a `--arg` value: JSON scalar if it parses, bare string otherwise
fn parse_variable(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Determine the configuration directory: flag, environment, then the
/// per-user config directory
fn resolve_config_dir(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    if let Ok(dir) = std::env::var("SQLBRIDGE_CONFIG_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::config_dir().context("could not determine user config directory")?;
    Ok(base.join("sqlbridge").join("databases"))
}

fn emit_result(database: &str, command: &str, result: QueryResult, start: Instant) {
    let rows = result.rows.len();
    emit(&SuccessEnvelope::new(
        database,
        command,
        result,
        Metadata::with_rows(elapsed_ms(start), rows),
    ));
}

fn emit<T: serde::Serialize>(envelope: &T) {
    match serde_json::to_string(envelope) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output envelope"),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
