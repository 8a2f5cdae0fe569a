//! `status` subcommands.

use super::{parse_metadata_arg, to_json};
use crate::coord::StatusRegistry;
use crate::error::{CoordError, Result};
use crate::types::{AgentState, StatusReport};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

#[derive(Subcommand, Debug)]
pub enum StatusCommand {
    /// Upsert an agent's status for a feature
    Report(ReportArgs),

    /// Show one agent's status for a feature
    Get {
        agent_id: String,
        feature_id: String,
    },

    /// List all agent statuses in a feature
    Feature { feature_id: String },

    /// List statuses with a given value across all features
    ByStatus {
        /// idle, working, blocked, completed or error
        status: String,
    },

    /// List unfinished agents that stopped reporting
    Stale {
        /// Silence threshold in seconds
        #[arg(long, default_value_t = 900)]
        older_than: i64,
    },
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    pub agent_id: String,
    pub feature_id: String,

    /// idle, working, blocked, completed or error
    pub status: String,

    /// Progress percentage, 0-100
    #[arg(long, default_value_t = 0)]
    pub progress: i32,

    #[arg(long)]
    pub phase: Option<String>,

    #[arg(long)]
    pub task: Option<String>,

    #[arg(long)]
    pub message: Option<String>,

    /// Arbitrary JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

pub(crate) fn parse_state(raw: &str) -> Result<AgentState> {
    AgentState::parse(raw).ok_or_else(|| {
        let valid: Vec<&str> = AgentState::ALL.iter().map(|s| s.as_str()).collect();
        CoordError::validation("status", format!("'{}' is not one of {}", raw, valid.join(", ")))
    })
}

pub fn run(registry: &StatusRegistry, cmd: StatusCommand) -> Result<Value> {
    match cmd {
        StatusCommand::Report(args) => {
            let report = StatusReport {
                current_phase: args.phase,
                current_task: args.task,
                progress: args.progress,
                message: args.message,
                metadata: parse_metadata_arg(args.metadata.as_deref())?,
            };
            let state = parse_state(&args.status)?;
            to_json(&registry.report_status(&args.agent_id, &args.feature_id, state, report)?)
        }
        StatusCommand::Get {
            agent_id,
            feature_id,
        } => match registry.get_status(&agent_id, &feature_id)? {
            Some(status) => to_json(&status),
            None => Err(CoordError::not_found(
                "status",
                format!("{}/{}", agent_id, feature_id),
            )),
        },
        StatusCommand::Feature { feature_id } => {
            let statuses = registry.list_statuses_by_feature(&feature_id)?;
            Ok(json!({ "feature_id": feature_id, "statuses": to_json(&statuses)? }))
        }
        StatusCommand::ByStatus { status } => {
            let state = parse_state(&status)?;
            let statuses = registry.list_statuses_by_status_value(state)?;
            Ok(json!({ "status": state.as_str(), "statuses": to_json(&statuses)? }))
        }
        StatusCommand::Stale { older_than } => {
            let statuses = registry.list_stale_statuses(older_than.saturating_mul(1000))?;
            Ok(json!({ "older_than_seconds": older_than, "statuses": to_json(&statuses)? }))
        }
    }
}
