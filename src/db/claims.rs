//! Task claims: an append-only ledger with at most one active row per task.

use super::{enum_column, now_ms, optional, Database};
use crate::error::{CoordError, Result};
use crate::types::{ClaimOutcome, ClaimStatus, TaskClaim};
use rusqlite::{params, Connection, Row};
use tracing::debug;

const CLAIM_COLUMNS: &str = "id, feature_id, phase, task_id, agent_id, status, claimed_at,
     released_at, released_by, release_reason";

/// Prefix stored on the release reason of claims ended by someone other than the holder.
pub const FORCED_PREFIX: &str = "[forced]";

fn parse_claim_row(row: &Row) -> rusqlite::Result<TaskClaim> {
    let status: String = row.get(5)?;
    Ok(TaskClaim {
        id: row.get(0)?,
        feature_id: row.get(1)?,
        phase: row.get(2)?,
        task_id: row.get(3)?,
        agent_id: row.get(4)?,
        status: enum_column(5, &status, ClaimStatus::parse)?,
        claimed_at: row.get(6)?,
        released_at: row.get(7)?,
        released_by: row.get(8)?,
        release_reason: row.get(9)?,
    })
}

fn query_claims<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<TaskClaim>> {
    let mut stmt = conn.prepare(sql)?;
    let claims = stmt
        .query_map(params, parse_claim_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(claims)
}

pub(crate) fn active_claim_internal(
    conn: &Connection,
    feature_id: &str,
    task_id: &str,
) -> Result<Option<TaskClaim>> {
    let sql = format!(
        "SELECT {} FROM task_claims
         WHERE feature_id = ?1 AND task_id = ?2 AND status = 'active'",
        CLAIM_COLUMNS
    );
    optional(conn.query_row(&sql, params![feature_id, task_id], parse_claim_row))
}

fn latest_claim_internal(conn: &Connection, feature_id: &str, task_id: &str) -> Result<Option<TaskClaim>> {
    let sql = format!(
        "SELECT {} FROM task_claims
         WHERE feature_id = ?1 AND task_id = ?2
         ORDER BY id DESC LIMIT 1",
        CLAIM_COLUMNS
    );
    optional(conn.query_row(&sql, params![feature_id, task_id], parse_claim_row))
}

/// Latest timestamp recorded for the task, so new timestamps never go backwards.
fn task_clock_floor(conn: &Connection, feature_id: &str, task_id: &str) -> Result<i64> {
    let floor: Option<i64> = conn.query_row(
        "SELECT MAX(MAX(claimed_at, COALESCE(released_at, 0))) FROM task_claims
         WHERE feature_id = ?1 AND task_id = ?2",
        params![feature_id, task_id],
        |row| row.get(0),
    )?;
    Ok(floor.unwrap_or(0))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Move an active claim to a terminal status.
fn close_claim(
    conn: &Connection,
    claim: TaskClaim,
    status: ClaimStatus,
    released_by: &str,
    reason: Option<String>,
) -> Result<TaskClaim> {
    let released_at = now_ms().max(claim.claimed_at);

    let updated = conn.execute(
        "UPDATE task_claims SET status = ?1, released_at = ?2, released_by = ?3, release_reason = ?4
         WHERE id = ?5 AND status = 'active'",
        params![status.as_str(), released_at, released_by, &reason, claim.id],
    )?;
    if updated == 0 {
        return Err(CoordError::Storage(format!(
            "claim {} changed while being released",
            claim.id
        )));
    }

    Ok(TaskClaim {
        status,
        released_at: Some(released_at),
        released_by: Some(released_by.to_string()),
        release_reason: reason,
        ..claim
    })
}

/// Abandon an active claim on behalf of someone other than the holder.
pub(crate) fn force_close_claim(
    conn: &Connection,
    claim: TaskClaim,
    operator_id: &str,
    reason: &str,
) -> Result<TaskClaim> {
    let tagged = format!("{} {}", FORCED_PREFIX, reason);
    close_claim(conn, claim, ClaimStatus::Abandoned, operator_id, Some(tagged))
}

impl Database {
    /// Claim a task for an agent.
    ///
    /// The lookup for an active claim and the insert run in one immediate
    /// transaction; the partial unique index on active claims backs it up if
    /// another connection slips in anyway.
    pub fn claim_task(
        &self,
        feature_id: &str,
        phase: &str,
        task_id: &str,
        agent_id: &str,
    ) -> Result<ClaimOutcome> {
        self.with_write_tx(|tx| {
            if let Some(active) = active_claim_internal(tx, feature_id, task_id)? {
                return Ok(ClaimOutcome::Denied {
                    held_by: active.agent_id,
                });
            }

            let claimed_at = now_ms().max(task_clock_floor(tx, feature_id, task_id)?);

            let inserted = tx.execute(
                "INSERT INTO task_claims (feature_id, phase, task_id, agent_id, status, claimed_at)
                 VALUES (?1, ?2, ?3, ?4, 'active', ?5)",
                params![feature_id, phase, task_id, agent_id, claimed_at],
            );

            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => {
                    let holder = active_claim_internal(tx, feature_id, task_id)?
                        .map(|c| c.agent_id)
                        .ok_or(CoordError::TransientStorage(
                            "active claim vanished after unique violation".to_string(),
                        ))?;
                    return Ok(ClaimOutcome::Denied { held_by: holder });
                }
                Err(e) => return Err(e.into()),
            }

            Ok(ClaimOutcome::Granted {
                claim: TaskClaim {
                    id: tx.last_insert_rowid(),
                    feature_id: feature_id.to_string(),
                    phase: phase.to_string(),
                    task_id: task_id.to_string(),
                    agent_id: agent_id.to_string(),
                    status: ClaimStatus::Active,
                    claimed_at,
                    released_at: None,
                    released_by: None,
                    release_reason: None,
                },
            })
        })
    }

    /// End the holder's active claim with `status` (completed or abandoned).
    ///
    /// If there is no active claim but the latest claim was already ended the
    /// same way by this agent, the stored row is returned unchanged. Ended the
    /// other way by this agent is `NotFound`; ended by anyone else is `NotHolder`.
    pub fn release_claim(
        &self,
        feature_id: &str,
        task_id: &str,
        agent_id: &str,
        status: ClaimStatus,
        reason: Option<String>,
    ) -> Result<TaskClaim> {
        self.with_write_tx(|tx| {
            if let Some(active) = active_claim_internal(tx, feature_id, task_id)? {
                if active.agent_id != agent_id {
                    return Err(CoordError::not_holder(
                        feature_id,
                        task_id,
                        agent_id,
                        Some(active.agent_id),
                    ));
                }
                return close_claim(tx, active, status, agent_id, reason);
            }

            match latest_claim_internal(tx, feature_id, task_id)? {
                None => Err(CoordError::not_found(
                    "claim",
                    format!("{}/{}", feature_id, task_id),
                )),
                Some(last)
                    if last.agent_id == agent_id
                        && last.status == status
                        && last.released_by.as_deref() == Some(agent_id) =>
                {
                    debug!(
                        feature_id,
                        task_id,
                        agent_id,
                        claim_id = last.id,
                        status = %status,
                        "Repeated release treated as no-op"
                    );
                    Ok(last)
                }
                // The agent ended its own claim the other way; there is nothing left to release
                Some(last)
                    if last.agent_id == agent_id && last.released_by.as_deref() == Some(agent_id) =>
                {
                    Err(CoordError::not_found(
                        "active claim",
                        format!("{}/{} (already {})", feature_id, task_id, last.status),
                    ))
                }
                Some(_) => Err(CoordError::not_holder(feature_id, task_id, agent_id, None)),
            }
        })
    }

    /// Abandon the active claim regardless of holder.
    pub fn force_release(
        &self,
        feature_id: &str,
        task_id: &str,
        operator_id: &str,
        reason: &str,
    ) -> Result<TaskClaim> {
        self.with_write_tx(|tx| {
            let active = active_claim_internal(tx, feature_id, task_id)?.ok_or_else(|| {
                CoordError::not_found("active claim", format!("{}/{}", feature_id, task_id))
            })?;
            force_close_claim(tx, active, operator_id, reason)
        })
    }

    /// Abandon every active claim whose holder has shown no sign of life since `cutoff_ms`.
    ///
    /// Sign of life is the later of the claim time and the holder's status
    /// update for the claim's feature.
    pub fn release_stale_claims(&self, cutoff_ms: i64, operator_id: &str) -> Result<Vec<TaskClaim>> {
        let sql = format!(
            "SELECT {} FROM task_claims c
             LEFT JOIN agent_status s ON s.agent_id = c.agent_id AND s.feature_id = c.feature_id
             WHERE c.status = 'active'
               AND MAX(c.claimed_at, COALESCE(s.last_update, 0)) < ?1
             ORDER BY c.id",
            CLAIM_COLUMNS
                .split(',')
                .map(|col| format!("c.{}", col.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.with_write_tx(|tx| {
            let stale = query_claims(tx, &sql, params![cutoff_ms])?;
            stale
                .into_iter()
                .map(|claim| force_close_claim(tx, claim, operator_id, "stale: holder stopped reporting"))
                .collect()
        })
    }

    /// Get the active claim on a task, if any.
    pub fn get_active_claim(&self, feature_id: &str, task_id: &str) -> Result<Option<TaskClaim>> {
        self.with_conn(|conn| active_claim_internal(conn, feature_id, task_id))
    }

    /// All claims in a feature, any status, newest first.
    pub fn list_claims_by_feature(&self, feature_id: &str) -> Result<Vec<TaskClaim>> {
        let sql = format!(
            "SELECT {} FROM task_claims WHERE feature_id = ?1 ORDER BY id DESC",
            CLAIM_COLUMNS
        );
        self.with_conn(|conn| query_claims(conn, &sql, params![feature_id]))
    }

    /// All claims ever made by an agent, newest first.
    pub fn list_claims_by_agent(&self, agent_id: &str) -> Result<Vec<TaskClaim>> {
        let sql = format!(
            "SELECT {} FROM task_claims WHERE agent_id = ?1 ORDER BY id DESC",
            CLAIM_COLUMNS
        );
        self.with_conn(|conn| query_claims(conn, &sql, params![agent_id]))
    }
}
