//! Conflict ledger rows and the involved-agents junction table.

use super::claims::{active_claim_internal, force_close_claim};
use super::{enum_column, now_ms, optional, parse_metadata, Database};
use crate::error::{CoordError, Result};
use crate::types::{
    AgentConflict, ConflictStatus, ConflictType, NewConflict, Resolution, TaskClaim,
};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

const CONFLICT_COLUMNS: &str = "c.id, c.feature_id, c.conflict_type, c.involved_agents, c.description,
     c.file_path, c.metadata, c.status, c.resolution, c.resolved_by, c.reported_at, c.resolved_at";

struct RawConflict {
    id: String,
    feature_id: String,
    conflict_type: ConflictType,
    involved_agents: String,
    description: String,
    file_path: Option<String>,
    metadata: Option<String>,
    status: ConflictStatus,
    resolution: Option<String>,
    resolved_by: Option<String>,
    reported_at: i64,
    resolved_at: Option<i64>,
}

fn parse_conflict_row(row: &Row) -> rusqlite::Result<RawConflict> {
    let conflict_type: String = row.get(2)?;
    let status: String = row.get(7)?;
    Ok(RawConflict {
        id: row.get(0)?,
        feature_id: row.get(1)?,
        conflict_type: enum_column(2, &conflict_type, ConflictType::parse)?,
        involved_agents: row.get(3)?,
        description: row.get(4)?,
        file_path: row.get(5)?,
        metadata: row.get(6)?,
        status: enum_column(7, &status, ConflictStatus::parse)?,
        resolution: row.get(8)?,
        resolved_by: row.get(9)?,
        reported_at: row.get(10)?,
        resolved_at: row.get(11)?,
    })
}

fn finish(raw: RawConflict) -> Result<AgentConflict> {
    let resolution = match (raw.status, raw.resolution, raw.resolved_by, raw.resolved_at) {
        (ConflictStatus::Pending, None, None, None) => None,
        (ConflictStatus::Resolved, Some(resolution), Some(resolved_by), Some(resolved_at)) => {
            Some(Resolution {
                resolution,
                resolved_by,
                resolved_at,
            })
        }
        _ => {
            return Err(CoordError::Storage(format!(
                "conflict {} has inconsistent resolution fields",
                raw.id
            )));
        }
    };

    Ok(AgentConflict {
        id: raw.id,
        feature_id: raw.feature_id,
        conflict_type: raw.conflict_type,
        involved_agents: serde_json::from_str(&raw.involved_agents)?,
        description: raw.description,
        file_path: raw.file_path,
        metadata: parse_metadata(raw.metadata)?,
        status: raw.status,
        reported_at: raw.reported_at,
        resolution,
    })
}

fn query_conflicts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<AgentConflict>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, parse_conflict_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(finish).collect()
}

fn get_conflict_internal(conn: &Connection, conflict_id: &str) -> Result<Option<AgentConflict>> {
    let sql = format!(
        "SELECT {} FROM agent_conflicts c WHERE c.id = ?1",
        CONFLICT_COLUMNS
    );
    optional(conn.query_row(&sql, params![conflict_id], parse_conflict_row))?
        .map(finish)
        .transpose()
}

/// Sort and deduplicate agent ids; the set is stored in this form.
pub fn normalize_agents(agents: &[String]) -> Vec<String> {
    let mut agents = agents.to_vec();
    agents.sort();
    agents.dedup();
    agents
}

/// Mark a pending conflict resolved. Fails if it is missing or already resolved.
fn resolve_internal(
    conn: &Connection,
    conflict_id: &str,
    resolution: &str,
    resolved_by: &str,
) -> Result<AgentConflict> {
    let conflict = get_conflict_internal(conn, conflict_id)?
        .ok_or_else(|| CoordError::not_found("conflict", conflict_id))?;

    if !conflict.is_pending() {
        return Err(CoordError::AlreadyResolved(conflict_id.to_string()));
    }

    let resolved_at = now_ms().max(conflict.reported_at);
    conn.execute(
        "UPDATE agent_conflicts SET status = 'resolved', resolution = ?1, resolved_by = ?2, resolved_at = ?3
         WHERE id = ?4 AND status = 'pending'",
        params![resolution, resolved_by, resolved_at, conflict_id],
    )?;

    Ok(AgentConflict {
        status: ConflictStatus::Resolved,
        resolution: Some(Resolution {
            resolution: resolution.to_string(),
            resolved_by: resolved_by.to_string(),
            resolved_at,
        }),
        ..conflict
    })
}

impl Database {
    /// Record a new pending conflict.
    pub fn insert_conflict(&self, conflict: &NewConflict) -> Result<AgentConflict> {
        let id = Uuid::now_v7().to_string();
        let now = now_ms();
        let agents = normalize_agents(&conflict.involved_agents);
        let agents_json = serde_json::to_string(&agents)?;
        let metadata = conflict
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO agent_conflicts (id, feature_id, conflict_type, involved_agents, description,
                     file_path, metadata, status, reported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
                params![
                    &id,
                    &conflict.feature_id,
                    conflict.conflict_type.as_str(),
                    &agents_json,
                    &conflict.description,
                    &conflict.file_path,
                    &metadata,
                    now,
                ],
            )?;

            for agent in &agents {
                tx.execute(
                    "INSERT INTO conflict_agents (conflict_id, agent_id) VALUES (?1, ?2)",
                    params![&id, agent],
                )?;
            }

            Ok(())
        })?;

        Ok(AgentConflict {
            id,
            feature_id: conflict.feature_id.clone(),
            conflict_type: conflict.conflict_type,
            involved_agents: agents,
            description: conflict.description.clone(),
            file_path: conflict.file_path.clone(),
            metadata: conflict.metadata.clone(),
            status: ConflictStatus::Pending,
            reported_at: now,
            resolution: None,
        })
    }

    /// Get a conflict by id.
    pub fn get_conflict(&self, conflict_id: &str) -> Result<Option<AgentConflict>> {
        self.with_conn(|conn| get_conflict_internal(conn, conflict_id))
    }

    /// Resolve a pending conflict (one-way).
    pub fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: &str,
        resolved_by: &str,
    ) -> Result<AgentConflict> {
        self.with_write_tx(|tx| resolve_internal(tx, conflict_id, resolution, resolved_by))
    }

    /// Resolve a conflict and abandon the active claims on `task_ids` in its feature.
    ///
    /// Both happen in one transaction: if the conflict is already resolved no
    /// claim is touched. Tasks with no active claim are skipped.
    pub fn resolve_conflict_and_release(
        &self,
        conflict_id: &str,
        resolution: &str,
        resolved_by: &str,
        task_ids: &[String],
    ) -> Result<(AgentConflict, Vec<TaskClaim>)> {
        self.with_write_tx(|tx| {
            let conflict = resolve_internal(tx, conflict_id, resolution, resolved_by)?;
            let reason = format!("conflict {} resolved: {}", conflict.id, resolution);

            let mut released = Vec::new();
            for task_id in task_ids {
                if let Some(active) = active_claim_internal(tx, &conflict.feature_id, task_id)? {
                    released.push(force_close_claim(tx, active, resolved_by, &reason)?);
                }
            }

            Ok((conflict, released))
        })
    }

    /// Pending conflicts in a feature, oldest first.
    pub fn list_pending_conflicts(&self, feature_id: &str) -> Result<Vec<AgentConflict>> {
        let sql = format!(
            "SELECT {} FROM agent_conflicts c
             WHERE c.feature_id = ?1 AND c.status = 'pending'
             ORDER BY c.reported_at, c.id",
            CONFLICT_COLUMNS
        );
        self.with_conn(|conn| query_conflicts(conn, &sql, params![feature_id]))
    }

    /// All conflicts in a feature, newest first.
    pub fn list_conflicts_by_feature(&self, feature_id: &str) -> Result<Vec<AgentConflict>> {
        let sql = format!(
            "SELECT {} FROM agent_conflicts c
             WHERE c.feature_id = ?1
             ORDER BY c.reported_at DESC, c.id DESC",
            CONFLICT_COLUMNS
        );
        self.with_conn(|conn| query_conflicts(conn, &sql, params![feature_id]))
    }

    /// All conflicts naming `agent_id`, newest first.
    pub fn list_conflicts_by_agent(&self, agent_id: &str) -> Result<Vec<AgentConflict>> {
        let sql = format!(
            "SELECT {} FROM agent_conflicts c
             INNER JOIN conflict_agents ca ON ca.conflict_id = c.id
             WHERE ca.agent_id = ?1
             ORDER BY c.reported_at DESC, c.id DESC",
            CONFLICT_COLUMNS
        );
        self.with_conn(|conn| query_conflicts(conn, &sql, params![agent_id]))
    }
}
