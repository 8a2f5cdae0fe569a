//! `claim` subcommands.

use super::to_json;
use crate::coord::ClaimManager;
use crate::error::{CoordError, Result};
use clap::Subcommand;
use serde_json::{json, Value};

#[derive(Subcommand, Debug)]
pub enum ClaimCommand {
    /// Claim a task; prints granted=false and the holder if it is taken
    Take {
        feature_id: String,
        phase: String,
        task_id: String,
        agent_id: String,
    },

    /// Complete a task held by the agent
    Complete {
        feature_id: String,
        task_id: String,
        agent_id: String,
    },

    /// Give up a task held by the agent
    Abandon {
        feature_id: String,
        task_id: String,
        agent_id: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Release a task regardless of holder
    ForceRelease {
        feature_id: String,
        task_id: String,
        #[arg(long)]
        operator: String,
        #[arg(long)]
        reason: String,
    },

    /// Show the active claim on a task
    Active { feature_id: String, task_id: String },

    /// Claim history of a feature, newest first
    Feature { feature_id: String },

    /// Claim history of an agent, newest first
    Agent { agent_id: String },
}

pub fn run(claims: &ClaimManager, cmd: ClaimCommand) -> Result<Value> {
    match cmd {
        ClaimCommand::Take {
            feature_id,
            phase,
            task_id,
            agent_id,
        } => to_json(&claims.claim_task(&feature_id, &phase, &task_id, &agent_id)?),
        ClaimCommand::Complete {
            feature_id,
            task_id,
            agent_id,
        } => to_json(&claims.complete_task(&feature_id, &task_id, &agent_id)?),
        ClaimCommand::Abandon {
            feature_id,
            task_id,
            agent_id,
            reason,
        } => to_json(&claims.abandon_task(&feature_id, &task_id, &agent_id, reason)?),
        ClaimCommand::ForceRelease {
            feature_id,
            task_id,
            operator,
            reason,
        } => to_json(&claims.force_release(&feature_id, &task_id, &operator, &reason)?),
        ClaimCommand::Active {
            feature_id,
            task_id,
        } => match claims.get_active_claim(&feature_id, &task_id)? {
            Some(claim) => to_json(&claim),
            None => Err(CoordError::not_found(
                "active claim",
                format!("{}/{}", feature_id, task_id),
            )),
        },
        ClaimCommand::Feature { feature_id } => {
            let history = claims.list_claims_by_feature(&feature_id)?;
            Ok(json!({ "feature_id": feature_id, "claims": to_json(&history)? }))
        }
        ClaimCommand::Agent { agent_id } => {
            let history = claims.list_claims_by_agent(&agent_id)?;
            Ok(json!({ "agent_id": agent_id, "claims": to_json(&history)? }))
        }
    }
}
