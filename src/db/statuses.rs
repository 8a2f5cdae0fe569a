//! Agent status rows: one per (agent, feature), last write wins.

use super::{enum_column, now_ms, optional, parse_metadata, Database};
use crate::error::Result;
use crate::types::{AgentState, AgentStatus, StatusReport};
use rusqlite::{params, Connection, Row};

const STATUS_COLUMNS: &str = "agent_id, feature_id, status, current_phase, current_task, progress,
     message, metadata, started_at, last_update";

struct RawStatus {
    status: AgentStatus,
    metadata: Option<String>,
}

fn parse_status_row(row: &Row) -> rusqlite::Result<RawStatus> {
    let status: String = row.get(2)?;
    Ok(RawStatus {
        status: AgentStatus {
            agent_id: row.get(0)?,
            feature_id: row.get(1)?,
            status: enum_column(2, &status, AgentState::parse)?,
            current_phase: row.get(3)?,
            current_task: row.get(4)?,
            progress: row.get(5)?,
            message: row.get(6)?,
            metadata: None,
            started_at: row.get(8)?,
            last_update: row.get(9)?,
        },
        metadata: row.get(7)?,
    })
}

fn finish(raw: RawStatus) -> Result<AgentStatus> {
    Ok(AgentStatus {
        metadata: parse_metadata(raw.metadata)?,
        ..raw.status
    })
}

fn query_statuses<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<AgentStatus>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, parse_status_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(finish).collect()
}

/// Internal helper to get a status using an existing connection (avoids deadlock).
pub(crate) fn get_status_internal(
    conn: &Connection,
    agent_id: &str,
    feature_id: &str,
) -> Result<Option<AgentStatus>> {
    let sql = format!(
        "SELECT {} FROM agent_status WHERE agent_id = ?1 AND feature_id = ?2",
        STATUS_COLUMNS
    );
    optional(conn.query_row(&sql, params![agent_id, feature_id], parse_status_row))?
        .map(finish)
        .transpose()
}

impl Database {
    /// Insert or overwrite the status row for (agent, feature).
    ///
    /// `started_at` is set only on first insert. `last_update` never moves
    /// backwards, even if the wall clock does.
    pub fn upsert_status(
        &self,
        agent_id: &str,
        feature_id: &str,
        status: AgentState,
        report: &StatusReport,
    ) -> Result<AgentStatus> {
        let now = now_ms();
        let metadata = report
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO agent_status (agent_id, feature_id, status, current_phase, current_task,
                     progress, message, metadata, started_at, last_update)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(agent_id, feature_id) DO UPDATE SET
                     status = excluded.status,
                     current_phase = excluded.current_phase,
                     current_task = excluded.current_task,
                     progress = excluded.progress,
                     message = excluded.message,
                     metadata = excluded.metadata,
                     last_update = MAX(agent_status.last_update, excluded.last_update)",
                params![
                    agent_id,
                    feature_id,
                    status.as_str(),
                    &report.current_phase,
                    &report.current_task,
                    report.progress,
                    &report.message,
                    metadata,
                    now,
                ],
            )?;

            get_status_internal(tx, agent_id, feature_id)?.ok_or_else(|| {
                crate::error::CoordError::Storage("status row missing after upsert".to_string())
            })
        })
    }

    /// Get the status row for (agent, feature).
    pub fn get_status(&self, agent_id: &str, feature_id: &str) -> Result<Option<AgentStatus>> {
        self.with_conn(|conn| get_status_internal(conn, agent_id, feature_id))
    }

    /// All statuses for a feature, most recently updated first.
    pub fn list_statuses_by_feature(&self, feature_id: &str) -> Result<Vec<AgentStatus>> {
        let sql = format!(
            "SELECT {} FROM agent_status WHERE feature_id = ?1
             ORDER BY last_update DESC, agent_id",
            STATUS_COLUMNS
        );
        self.with_conn(|conn| query_statuses(conn, &sql, params![feature_id]))
    }

    /// All statuses with the given value across every feature.
    pub fn list_statuses_by_state(&self, status: AgentState) -> Result<Vec<AgentStatus>> {
        let sql = format!(
            "SELECT {} FROM agent_status WHERE status = ?1
             ORDER BY last_update DESC, feature_id, agent_id",
            STATUS_COLUMNS
        );
        self.with_conn(|conn| query_statuses(conn, &sql, params![status.as_str()]))
    }

    /// Statuses not updated since `cutoff_ms`, excluding agents that reported completion.
    pub fn list_statuses_updated_before(&self, cutoff_ms: i64) -> Result<Vec<AgentStatus>> {
        let sql = format!(
            "SELECT {} FROM agent_status WHERE last_update < ?1 AND status != 'completed'
             ORDER BY last_update, feature_id, agent_id",
            STATUS_COLUMNS
        );
        self.with_conn(|conn| query_statuses(conn, &sql, params![cutoff_ms]))
    }
}
