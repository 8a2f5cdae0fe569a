//! Coordination components: status registry, claim manager and conflict ledger.
//!
//! Each component is a thin handle over a [`Database`]. They validate input,
//! delegate to the storage layer and log every mutation. None of them keeps
//! state of its own, so any number of handles (in any number of processes)
//! can share one database file.

pub mod claims;
pub mod conflicts;
pub mod status;

pub use claims::ClaimManager;
pub use conflicts::ConflictLedger;
pub use status::StatusRegistry;

use crate::db::Database;
use crate::error::{CoordError, Result};

/// All three components over one storage handle.
#[derive(Clone)]
pub struct Coordinator {
    pub status: StatusRegistry,
    pub claims: ClaimManager,
    pub conflicts: ConflictLedger,
}

impl Coordinator {
    pub fn new(db: Database) -> Self {
        Self {
            status: StatusRegistry::new(db.clone()),
            claims: ClaimManager::new(db.clone()),
            conflicts: ConflictLedger::new(db),
        }
    }
}

/// Reject empty or whitespace-only identifiers and required text.
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(CoordError::missing_field(field));
    }
    Ok(())
}
