//! Status registry: last-write-wins projection of what each agent is doing.

use super::require;
use crate::db::{now_ms, Database};
use crate::error::{CoordError, Result};
use crate::types::{AgentState, AgentStatus, StatusReport};
use tracing::{debug, info};

pub const MIN_PROGRESS: i32 = 0;
pub const MAX_PROGRESS: i32 = 100;

#[derive(Clone)]
pub struct StatusRegistry {
    db: Database,
}

impl StatusRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upsert the status row for (agent, feature).
    ///
    /// Any state may follow any other; a supervisor can force `error` from
    /// wherever the agent was.
    pub fn report_status(
        &self,
        agent_id: &str,
        feature_id: &str,
        status: AgentState,
        report: StatusReport,
    ) -> Result<AgentStatus> {
        require("agent_id", agent_id)?;
        require("feature_id", feature_id)?;
        if !(MIN_PROGRESS..=MAX_PROGRESS).contains(&report.progress) {
            return Err(CoordError::validation(
                "progress",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_PROGRESS, MAX_PROGRESS, report.progress
                ),
            ));
        }

        let row = self.db.upsert_status(agent_id, feature_id, status, &report)?;
        info!(
            agent_id,
            feature_id,
            status = %row.status,
            progress = row.progress,
            phase = row.current_phase.as_deref().unwrap_or(""),
            task = row.current_task.as_deref().unwrap_or(""),
            "Agent status reported"
        );
        Ok(row)
    }

    pub fn get_status(&self, agent_id: &str, feature_id: &str) -> Result<Option<AgentStatus>> {
        self.db.get_status(agent_id, feature_id)
    }

    /// Statuses in a feature, most recently updated first.
    pub fn list_statuses_by_feature(&self, feature_id: &str) -> Result<Vec<AgentStatus>> {
        let rows = self.db.list_statuses_by_feature(feature_id)?;
        debug!(feature_id, count = rows.len(), "Listed statuses by feature");
        Ok(rows)
    }

    /// Statuses with a given value across all features (e.g. every `blocked` agent).
    pub fn list_statuses_by_status_value(&self, status: AgentState) -> Result<Vec<AgentStatus>> {
        self.db.list_statuses_by_state(status)
    }

    /// Unfinished agents that have not reported for `older_than_ms`.
    pub fn list_stale_statuses(&self, older_than_ms: i64) -> Result<Vec<AgentStatus>> {
        if older_than_ms < 0 {
            return Err(CoordError::validation("older_than_ms", "must not be negative"));
        }
        self.db.list_statuses_updated_before(now_ms() - older_than_ms)
    }
}
