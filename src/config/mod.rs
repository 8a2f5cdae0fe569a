//! Configuration for the coordination store and the operator CLI.
//!
//! Tiers, lowest to highest priority:
//! 1. **Defaults** - [`Config::default`]
//! 2. **Project** - `$CWD/agent-coord/config.yaml`
//! 3. **User** - `~/.agent-coord/config.yaml`
//! 4. **Environment** - variables below
//!
//! YAML tiers are merged key by key. CLI flags are applied by the binary on
//! top of the loaded config.
//!
//! ## Environment Variables
//! - `AGENT_COORD_CONFIG_PATH` - Explicit config file (replaces project and user tiers)
//! - `AGENT_COORD_DB_PATH` - Database path
//! - `AGENT_COORD_STALE_TIMEOUT` - Seconds without a status update before a claim is stale
//! - `AGENT_COORD_SWEEP_INTERVAL` - Seconds between stale-claim sweeps
//! - `AGENT_COORD_USER_DIR` - User config dir (default: `~/.agent-coord`)
//! - `AGENT_COORD_PROJECT_DIR` - Project config dir (default: `./agent-coord`)

mod loader;

pub use loader::{ConfigLoader, ConfigPaths};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// A claim whose holder has been silent this long may be swept.
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_seconds: i64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,

    /// Recorded as `released_by` on claims released by the sweeper.
    #[serde(default = "default_sweep_operator")]
    pub sweep_operator: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            stale_timeout_seconds: default_stale_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            sweep_operator: default_sweep_operator(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".agent-coord/coord.db")
}

fn default_stale_timeout() -> i64 {
    900 // 15 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_sweep_operator() -> String {
    "sweeper".to_string()
}

impl Config {
    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
