//! Claim manager: exclusive ownership of a (feature, task) by one agent.
//!
//! A claim row is the lock. Granting is a single immediate transaction in the
//! storage layer, so two agents racing for the same task can never both win,
//! whether they share a process or only a database file.

use super::require;
use crate::db::{now_ms, Database};
use crate::error::{CoordError, Result};
use crate::types::{ClaimOutcome, ClaimStatus, TaskClaim};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ClaimManager {
    db: Database,
}

impl ClaimManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Try to claim a task. Never overwrites an active claim and never waits:
    /// if the task is held the outcome names the holder and the caller decides
    /// whether to back off and retry.
    pub fn claim_task(
        &self,
        feature_id: &str,
        phase: &str,
        task_id: &str,
        agent_id: &str,
    ) -> Result<ClaimOutcome> {
        require("feature_id", feature_id)?;
        require("phase", phase)?;
        require("task_id", task_id)?;
        require("agent_id", agent_id)?;

        let outcome = self.db.claim_task(feature_id, phase, task_id, agent_id)?;
        match &outcome {
            ClaimOutcome::Granted { claim } => info!(
                feature_id,
                phase,
                task_id,
                agent_id,
                claim_id = claim.id,
                "Task claimed"
            ),
            ClaimOutcome::Denied { held_by } => info!(
                feature_id,
                task_id,
                agent_id,
                held_by = %held_by,
                "Task claim denied"
            ),
        }
        Ok(outcome)
    }

    /// Mark the holder's claim completed. Retrying a completion this agent
    /// already made returns the completed row again.
    pub fn complete_task(&self, feature_id: &str, task_id: &str, agent_id: &str) -> Result<TaskClaim> {
        self.release(feature_id, task_id, agent_id, ClaimStatus::Completed, None)
    }

    /// Give up the holder's claim so another agent can take the task.
    pub fn abandon_task(
        &self,
        feature_id: &str,
        task_id: &str,
        agent_id: &str,
        reason: Option<String>,
    ) -> Result<TaskClaim> {
        self.release(feature_id, task_id, agent_id, ClaimStatus::Abandoned, reason)
    }

    fn release(
        &self,
        feature_id: &str,
        task_id: &str,
        agent_id: &str,
        status: ClaimStatus,
        reason: Option<String>,
    ) -> Result<TaskClaim> {
        require("feature_id", feature_id)?;
        require("task_id", task_id)?;
        require("agent_id", agent_id)?;

        let claim = self
            .db
            .release_claim(feature_id, task_id, agent_id, status, reason)
            .inspect_err(|err| {
                if let CoordError::NotHolder { .. } = err {
                    warn!(feature_id, task_id, agent_id, error = %err, "Release by non-holder rejected");
                }
            })?;
        info!(
            feature_id,
            task_id,
            agent_id,
            claim_id = claim.id,
            status = %claim.status,
            "Task claim released"
        );
        Ok(claim)
    }

    /// Abandon the active claim whoever holds it, for recovering from a
    /// crashed agent. Recorded with a `[forced]` reason and the operator id.
    pub fn force_release(
        &self,
        feature_id: &str,
        task_id: &str,
        operator_id: &str,
        reason: &str,
    ) -> Result<TaskClaim> {
        require("feature_id", feature_id)?;
        require("task_id", task_id)?;
        require("operator_id", operator_id)?;
        require("reason", reason)?;

        let claim = self.db.force_release(feature_id, task_id, operator_id, reason)?;
        warn!(
            feature_id,
            task_id,
            operator_id,
            holder = %claim.agent_id,
            claim_id = claim.id,
            reason,
            "Task claim force-released"
        );
        Ok(claim)
    }

    /// Force-release claims whose holder has not reported status (or claimed)
    /// within `stale_after_ms`.
    pub fn release_stale(&self, stale_after_ms: i64, operator_id: &str) -> Result<Vec<TaskClaim>> {
        require("operator_id", operator_id)?;
        if stale_after_ms < 0 {
            return Err(CoordError::validation("stale_after_ms", "must not be negative"));
        }

        let released = self
            .db
            .release_stale_claims(now_ms() - stale_after_ms, operator_id)?;
        for claim in &released {
            warn!(
                feature_id = %claim.feature_id,
                task_id = %claim.task_id,
                holder = %claim.agent_id,
                claim_id = claim.id,
                operator_id,
                "Stale task claim released"
            );
        }
        Ok(released)
    }

    pub fn get_active_claim(&self, feature_id: &str, task_id: &str) -> Result<Option<TaskClaim>> {
        self.db.get_active_claim(feature_id, task_id)
    }

    /// Full claim history of a feature, newest first.
    pub fn list_claims_by_feature(&self, feature_id: &str) -> Result<Vec<TaskClaim>> {
        self.db.list_claims_by_feature(feature_id)
    }

    pub fn list_claims_by_agent(&self, agent_id: &str) -> Result<Vec<TaskClaim>> {
        self.db.list_claims_by_agent(agent_id)
    }
}
