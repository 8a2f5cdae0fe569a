//! Tiered configuration loading.

use super::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "config.yaml";

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
    /// Explicit file; when set the project and user tiers are skipped.
    pub explicit_file: Option<PathBuf>,
}

impl ConfigPaths {
    /// Discover configuration paths from environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("AGENT_COORD_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".agent-coord")));

        let project_dir = std::env::var("AGENT_COORD_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("agent-coord")));

        let explicit_file = std::env::var("AGENT_COORD_CONFIG_PATH")
            .ok()
            .map(PathBuf::from);

        Self {
            project_dir,
            user_dir,
            explicit_file,
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
            explicit_file: None,
        }
    }
}

/// Loads and merges the configuration tiers.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: Config,
    /// Files that contributed, lowest tier first.
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load from discovered paths and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(ConfigPaths::discover(), |key| std::env::var(key).ok())
    }

    /// Load from explicit paths, ignoring the environment.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        Self::load_with(paths, |_| None)
    }

    /// Load from explicit paths with `env` supplying variable lookups.
    pub fn load_with(paths: ConfigPaths, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        let mut sources = Vec::new();

        let files: Vec<PathBuf> = match paths.explicit_file {
            // An explicit file must exist
            Some(file) => {
                if !file.exists() {
                    anyhow::bail!("config file {} not found", file.display());
                }
                vec![file]
            }
            None => [paths.project_dir, paths.user_dir]
                .into_iter()
                .flatten()
                .map(|dir| dir.join(CONFIG_FILE))
                .collect(),
        };

        for file in files {
            if let Some(layer) = read_yaml(&file)? {
                debug!(path = %file.display(), "Merging config file");
                overlay(&mut merged, layer);
                sources.push(file);
            }
        }

        let mut config: Config = serde_json::from_value(merged).context("invalid configuration")?;
        apply_env_overrides(&mut config, env)?;

        Ok(Self { config, sources })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn read_yaml(path: &Path) -> Result<Option<Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(value))
}

/// Merge `layer` into `base` key by key. Nulls in `layer` leave `base` alone;
/// any non-object value replaces what was there.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None if !value.is_null() => {
                        base_map.insert(key, value);
                    }
                    None => {}
                }
            }
        }
        (_, Value::Null) => {}
        (base, layer) => *base = layer,
    }
}

fn apply_env_overrides(config: &mut Config, env: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(db_path) = env("AGENT_COORD_DB_PATH") {
        config.server.db_path = PathBuf::from(db_path);
    }

    if let Some(timeout) = env("AGENT_COORD_STALE_TIMEOUT") {
        config.server.stale_timeout_seconds = timeout
            .parse()
            .with_context(|| format!("AGENT_COORD_STALE_TIMEOUT is not a number: {}", timeout))?;
    }

    if let Some(interval) = env("AGENT_COORD_SWEEP_INTERVAL") {
        config.server.sweep_interval_seconds = interval
            .parse()
            .with_context(|| format!("AGENT_COORD_SWEEP_INTERVAL is not a number: {}", interval))?;
    }

    Ok(())
}
