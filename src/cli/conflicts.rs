//! `conflict` subcommands.

use super::{parse_metadata_arg, to_json};
use crate::coord::ConflictLedger;
use crate::error::{CoordError, Result};
use crate::types::{ConflictType, NewConflict};
use clap::{Args, Subcommand};
use serde_json::{json, Value};

#[derive(Subcommand, Debug)]
pub enum ConflictCommand {
    /// Record a conflict between agents
    Report(ReportArgs),

    /// Resolve a pending conflict
    Resolve {
        conflict_id: String,
        resolution: String,
        #[arg(long)]
        by: String,

        /// Also abandon active claims on these tasks (comma-separated)
        #[arg(long, value_delimiter = ',')]
        release_tasks: Vec<String>,
    },

    /// Show one conflict
    Get { conflict_id: String },

    /// Pending conflicts in a feature, oldest first
    Pending { feature_id: String },

    /// All conflicts in a feature, newest first
    Feature { feature_id: String },

    /// Conflicts involving an agent, newest first
    Agent { agent_id: String },
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    pub feature_id: String,

    /// file_modification, implementation_disagreement or test_failure
    pub conflict_type: String,

    pub description: String,

    /// Involved agents (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub agents: Vec<String>,

    #[arg(long)]
    pub file: Option<String>,

    /// Arbitrary JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

fn parse_conflict_type(raw: &str) -> Result<ConflictType> {
    ConflictType::parse(raw).ok_or_else(|| {
        let valid: Vec<&str> = ConflictType::ALL.iter().map(|t| t.as_str()).collect();
        CoordError::validation(
            "conflict_type",
            format!("'{}' is not one of {}", raw, valid.join(", ")),
        )
    })
}

pub fn run(ledger: &ConflictLedger, cmd: ConflictCommand) -> Result<Value> {
    match cmd {
        ConflictCommand::Report(args) => {
            let conflict = NewConflict {
                feature_id: args.feature_id,
                conflict_type: parse_conflict_type(&args.conflict_type)?,
                involved_agents: args.agents,
                description: args.description,
                file_path: args.file,
                metadata: parse_metadata_arg(args.metadata.as_deref())?,
            };
            to_json(&ledger.report_conflict(conflict)?)
        }
        ConflictCommand::Resolve {
            conflict_id,
            resolution,
            by,
            release_tasks,
        } => {
            if release_tasks.is_empty() {
                return to_json(&ledger.resolve_conflict(&conflict_id, &resolution, &by)?);
            }
            let (conflict, released) =
                ledger.resolve_and_release(&conflict_id, &resolution, &by, &release_tasks)?;
            Ok(json!({
                "conflict": to_json(&conflict)?,
                "released_claims": to_json(&released)?,
            }))
        }
        ConflictCommand::Get { conflict_id } => match ledger.get_conflict(&conflict_id)? {
            Some(conflict) => to_json(&conflict),
            None => Err(CoordError::not_found("conflict", conflict_id)),
        },
        ConflictCommand::Pending { feature_id } => {
            let pending = ledger.list_pending_conflicts(&feature_id)?;
            Ok(json!({ "feature_id": feature_id, "conflicts": to_json(&pending)? }))
        }
        ConflictCommand::Feature { feature_id } => {
            let all = ledger.list_conflicts_by_feature(&feature_id)?;
            Ok(json!({ "feature_id": feature_id, "conflicts": to_json(&all)? }))
        }
        ConflictCommand::Agent { agent_id } => {
            let involved = ledger.list_conflicts_by_agent(&agent_id)?;
            Ok(json!({ "agent_id": agent_id, "conflicts": to_json(&involved)? }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coordinator;
    use crate::db::Database;
    use crate::error::ErrorCode;

    fn setup() -> Coordinator {
        Coordinator::new(Database::open_in_memory().unwrap())
    }

    fn report(conflict_type: &str) -> ConflictCommand {
        ConflictCommand::Report(ReportArgs {
            feature_id: "F".to_string(),
            conflict_type: conflict_type.to_string(),
            description: "both edited foo.ts".to_string(),
            agents: vec!["B".to_string(), "A".to_string()],
            file: Some("src/foo.ts".to_string()),
            metadata: None,
        })
    }

    fn resolve(id: &str, release_tasks: Vec<String>) -> ConflictCommand {
        ConflictCommand::Resolve {
            conflict_id: id.to_string(),
            resolution: "kept A's version".to_string(),
            by: "lead".to_string(),
            release_tasks,
        }
    }

    #[test]
    fn test_parse_conflict_type_rejects_unknown_values() {
        assert_eq!(
            parse_conflict_type("test_failure").unwrap(),
            ConflictType::TestFailure
        );

        let err = parse_conflict_type("merge_conflict").unwrap_err();
        assert!(matches!(err, CoordError::Validation { ref field, .. } if field == "conflict_type"));
    }

    #[test]
    fn test_report_with_unknown_type_writes_nothing() {
        let coord = setup();

        let err = run(&coord.conflicts, report("merge_conflict")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(coord.conflicts.list_conflicts_by_feature("F").unwrap().is_empty());
    }

    #[test]
    fn test_report_resolve_and_list() {
        let coord = setup();

        let reported = run(&coord.conflicts, report("file_modification")).unwrap();
        assert_eq!(reported["status"], "pending");
        assert_eq!(reported["involved_agents"], serde_json::json!(["A", "B"]));
        let id = reported["id"].as_str().unwrap().to_string();

        let pending = run(
            &coord.conflicts,
            ConflictCommand::Pending {
                feature_id: "F".to_string(),
            },
        )
        .unwrap();
        assert_eq!(pending["conflicts"][0]["id"], id.as_str());

        let resolved = run(&coord.conflicts, resolve(&id, vec![])).unwrap();
        assert_eq!(resolved["status"], "resolved");
        assert_eq!(resolved["resolved_by"], "lead");

        let err = run(&coord.conflicts, resolve(&id, vec![])).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyResolved);

        let for_a = run(
            &coord.conflicts,
            ConflictCommand::Agent {
                agent_id: "A".to_string(),
            },
        )
        .unwrap();
        assert_eq!(for_a["conflicts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_with_release_tasks_frees_claims() {
        let coord = setup();
        coord.claims.claim_task("F", "impl", "T1", "A").unwrap();
        coord.claims.claim_task("F", "impl", "T2", "B").unwrap();

        let reported = run(&coord.conflicts, report("file_modification")).unwrap();
        let id = reported["id"].as_str().unwrap();

        let out = run(&coord.conflicts, resolve(id, vec!["T2".to_string()])).unwrap();
        assert_eq!(out["conflict"]["status"], "resolved");
        let released = out["released_claims"].as_array().unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0]["task_id"], "T2");
        assert_eq!(released[0]["agent_id"], "B");

        assert!(coord.claims.get_active_claim("F", "T2").unwrap().is_none());
        assert!(coord.claims.get_active_claim("F", "T1").unwrap().is_some());
    }

    #[test]
    fn test_get_missing_conflict_is_not_found() {
        let coord = setup();

        let err = run(
            &coord.conflicts,
            ConflictCommand::Get {
                conflict_id: "missing".to_string(),
            },
        )
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
