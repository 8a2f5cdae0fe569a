//! Storage layer for the coordination tables.

pub mod claims;
pub mod conflicts;
pub mod statuses;

use crate::error::{CoordError, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

const MIGRATION_ATTEMPTS: u32 = 8;
const MIGRATION_BACKOFF: Duration = Duration::from_millis(25);

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Database handle wrapping a SQLite connection.
///
/// Clones share one connection. Separate `open` calls on the same file get
/// separate connections and coordinate through SQLite locking, the same way
/// independent agent processes would.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // busy_timeout first so a concurrent first open waits for the WAL switch.
        // WAL lets readers proceed while a claim transaction holds the write lock
        conn.execute_batch(
            "PRAGMA busy_timeout=5000;
             PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Apply pending migrations.
    ///
    /// Processes opening a new file at the same moment all see an empty
    /// history; every one but the first then fails on `CREATE TABLE` or on a
    /// stale WAL snapshot. Re-running the runner re-reads the history, so a
    /// loser finds the schema in place and has nothing left to apply.
    fn run_migrations(&self) -> Result<()> {
        let mut conn = self.lock()?;
        let mut attempt = 1;
        loop {
            match embedded::migrations::runner().run(&mut *conn) {
                Ok(_) => return Ok(()),
                Err(err) if attempt < MIGRATION_ATTEMPTS => {
                    debug!(attempt, error = %err, "Migration raced another connection, retrying");
                    std::thread::sleep(MIGRATION_BACKOFF * attempt);
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempts = attempt, error = %err, "Migrations failed");
                    return Err(err.into());
                }
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CoordError::Storage("connection mutex poisoned".to_string()))
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is taken before `f` reads anything, so a
    /// check-then-write inside `f` cannot interleave with another writer on
    /// the same file. The transaction commits only if `f` returns `Ok`.
    pub fn with_write_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Map `QueryReturnedNoRows` to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decode a nullable JSON text column into an object map.
pub(crate) fn parse_metadata(raw: Option<String>) -> Result<Option<crate::types::Metadata>> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(CoordError::from)
}

/// Convert a text column holding an enum value, failing on unknown values.
pub(crate) fn enum_column<T>(
    idx: usize,
    raw: &str,
    parse: fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    parse(raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown value '{}'", raw).into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_create_coordination_tables() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'refinery%'
                     AND name != 'sqlite_sequence' ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(names)
            })
            .unwrap();

        assert_eq!(
            tables,
            vec!["agent_conflicts", "agent_status", "conflict_agents", "task_claims"]
        );
    }

    #[test]
    fn write_tx_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();

        let result: Result<()> = db.with_write_tx(|tx| {
            tx.execute(
                "INSERT INTO task_claims (feature_id, phase, task_id, agent_id, status, claimed_at)
                 VALUES ('F', 'impl', 'T1', 'A', 'active', 1)",
                [],
            )?;
            Err(CoordError::missing_field("anything"))
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM task_claims", [], |row| row.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn active_claim_uniqueness_is_enforced_by_schema() {
        let db = Database::open_in_memory().unwrap();

        let result = db.with_conn(|conn| {
            for agent in ["A", "B"] {
                conn.execute(
                    "INSERT INTO task_claims (feature_id, phase, task_id, agent_id, status, claimed_at)
                     VALUES ('F', 'impl', 'T1', ?1, 'active', 1)",
                    [agent],
                )?;
            }
            Ok(())
        });

        assert!(matches!(result, Err(CoordError::Storage(_))));
    }
}
