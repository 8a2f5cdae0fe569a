//! Conflict ledger: pending -> resolved, once.

use super::require;
use crate::db::Database;
use crate::error::{CoordError, Result};
use crate::types::{AgentConflict, NewConflict, TaskClaim};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ConflictLedger {
    db: Database,
}

impl ConflictLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a conflict. Only field presence is checked.
    pub fn report_conflict(&self, conflict: NewConflict) -> Result<AgentConflict> {
        require("feature_id", &conflict.feature_id)?;
        require("description", &conflict.description)?;
        if conflict.involved_agents.is_empty() {
            return Err(CoordError::validation(
                "involved_agents",
                "at least one agent is required",
            ));
        }
        for agent in &conflict.involved_agents {
            require("involved_agents", agent)?;
        }

        let recorded = self.db.insert_conflict(&conflict)?;
        info!(
            conflict_id = %recorded.id,
            feature_id = %recorded.feature_id,
            conflict_type = %recorded.conflict_type,
            agents = ?recorded.involved_agents,
            file_path = recorded.file_path.as_deref().unwrap_or(""),
            "Conflict reported"
        );
        Ok(recorded)
    }

    /// Resolve a pending conflict. A second resolution fails with
    /// `AlreadyResolved` and leaves the first one in place.
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: &str,
        resolved_by: &str,
    ) -> Result<AgentConflict> {
        require("conflict_id", conflict_id)?;
        require("resolution", resolution)?;
        require("resolved_by", resolved_by)?;

        let resolved = self
            .db
            .resolve_conflict(conflict_id, resolution, resolved_by)
            .inspect_err(|err| log_rejected(conflict_id, resolved_by, err))?;
        info!(conflict_id, resolved_by, "Conflict resolved");
        Ok(resolved)
    }

    /// Resolve a conflict and abandon the active claims on `task_ids` in the
    /// conflict's feature, atomically.
    pub fn resolve_and_release(
        &self,
        conflict_id: &str,
        resolution: &str,
        resolved_by: &str,
        task_ids: &[String],
    ) -> Result<(AgentConflict, Vec<TaskClaim>)> {
        require("conflict_id", conflict_id)?;
        require("resolution", resolution)?;
        require("resolved_by", resolved_by)?;

        let (resolved, released) = self
            .db
            .resolve_conflict_and_release(conflict_id, resolution, resolved_by, task_ids)
            .inspect_err(|err| log_rejected(conflict_id, resolved_by, err))?;
        for claim in &released {
            warn!(
                conflict_id,
                feature_id = %claim.feature_id,
                task_id = %claim.task_id,
                holder = %claim.agent_id,
                "Task claim released by conflict resolution"
            );
        }
        info!(conflict_id, resolved_by, released = released.len(), "Conflict resolved");
        Ok((resolved, released))
    }

    pub fn get_conflict(&self, conflict_id: &str) -> Result<Option<AgentConflict>> {
        self.db.get_conflict(conflict_id)
    }

    /// Unresolved conflicts in a feature, oldest first.
    pub fn list_pending_conflicts(&self, feature_id: &str) -> Result<Vec<AgentConflict>> {
        self.db.list_pending_conflicts(feature_id)
    }

    pub fn list_conflicts_by_feature(&self, feature_id: &str) -> Result<Vec<AgentConflict>> {
        self.db.list_conflicts_by_feature(feature_id)
    }

    /// Conflicts that name `agent_id` among the involved agents.
    pub fn list_conflicts_by_agent(&self, agent_id: &str) -> Result<Vec<AgentConflict>> {
        self.db.list_conflicts_by_agent(agent_id)
    }
}

fn log_rejected(conflict_id: &str, resolved_by: &str, err: &CoordError) {
    if let CoordError::AlreadyResolved(_) = err {
        warn!(conflict_id, resolved_by, "Conflict already resolved");
    }
}
