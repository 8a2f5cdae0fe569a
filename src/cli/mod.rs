//! CLI command definitions for agent-coord
//!
//! Every subcommand maps onto one coordination operation and prints its
//! result as JSON, so the binary can be driven from scripts and supervisors.

pub mod claims;
pub mod conflicts;
pub mod status;
pub mod sweep;

use crate::coord::Coordinator;
use crate::error::{CoordError, Result};
use crate::types::Metadata;
use clap::{Parser, Subcommand};
use claims::ClaimCommand;
use conflicts::ConflictCommand;
use serde_json::Value;
use status::StatusCommand;
use sweep::SweepArgs;

/// Task claims, agent status and conflict ledger for multi-agent feature work
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report and query agent status
    #[command(subcommand)]
    Status(StatusCommand),

    /// Claim, complete, abandon and inspect task claims
    #[command(subcommand)]
    Claim(ClaimCommand),

    /// Report, resolve and list conflicts
    #[command(subcommand)]
    Conflict(ConflictCommand),

    /// Periodically force-release claims held by silent agents
    Sweep(SweepArgs),
}

/// Run a one-shot command (everything except `sweep`).
pub fn run_command(coord: &Coordinator, command: Command) -> Result<Value> {
    match command {
        Command::Status(cmd) => status::run(&coord.status, cmd),
        Command::Claim(cmd) => claims::run(&coord.claims, cmd),
        Command::Conflict(cmd) => conflicts::run(&coord.conflicts, cmd),
        Command::Sweep(_) => Err(CoordError::validation(
            "command",
            "sweep is long-running and is started by the binary",
        )),
    }
}

/// Exit code for coordination errors (validation, not-holder, storage...).
pub const EXIT_COORD_ERROR: i32 = 1;
/// Exit code for transient storage errors; the same call may be retried.
pub const EXIT_RETRY: i32 = 75;

/// Process exit code for a failed command.
pub fn exit_code(err: &CoordError) -> i32 {
    if err.is_transient() {
        EXIT_RETRY
    } else {
        EXIT_COORD_ERROR
    }
}

/// Serialize an operation result for output.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Parse a `--metadata` argument, which must be a JSON object.
pub(crate) fn parse_metadata_arg(raw: Option<&str>) -> Result<Option<Metadata>> {
    raw.map(|s| {
        serde_json::from_str::<Metadata>(s)
            .map_err(|e| CoordError::validation("metadata", format!("expected a JSON object: {}", e)))
    })
    .transpose()
}
