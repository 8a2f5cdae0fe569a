//! `sweep`: periodic release of claims held by agents that went silent.

use crate::config::ServerConfig;
use crate::coord::ClaimManager;
use crate::error::Result;
use crate::types::TaskClaim;
use clap::Args;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Run a single pass and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between passes (overrides config)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Seconds of holder silence before a claim is released (overrides config)
    #[arg(long)]
    pub stale_after: Option<i64>,

    /// Operator id recorded on released claims (overrides config)
    #[arg(long)]
    pub operator: Option<String>,
}

/// Effective sweep settings after CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    pub interval: Duration,
    pub stale_after_ms: i64,
    pub operator: String,
}

impl SweepSettings {
    pub fn resolve(server: &ServerConfig, args: &SweepArgs) -> Self {
        let interval = args.interval.unwrap_or(server.sweep_interval_seconds).max(1);
        let stale_after = args.stale_after.unwrap_or(server.stale_timeout_seconds);
        Self {
            interval: Duration::from_secs(interval),
            stale_after_ms: stale_after.saturating_mul(1000),
            operator: args
                .operator
                .clone()
                .unwrap_or_else(|| server.sweep_operator.clone()),
        }
    }
}

/// One pass over all active claims.
pub fn sweep_once(claims: &ClaimManager, settings: &SweepSettings) -> Result<Vec<TaskClaim>> {
    let released = claims.release_stale(settings.stale_after_ms, &settings.operator)?;
    debug!(released = released.len(), "Sweep pass finished");
    Ok(released)
}

/// Sweep on an interval until Ctrl-C. Transient storage errors are logged and
/// retried on the next tick; anything else stops the loop.
pub async fn run_loop(claims: ClaimManager, settings: SweepSettings) -> Result<()> {
    info!(
        interval_secs = settings.interval.as_secs(),
        stale_after_ms = settings.stale_after_ms,
        operator = %settings.operator,
        "Stale claim sweeper started"
    );

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pass_claims = claims.clone();
                let pass_settings = settings.clone();
                let outcome = tokio::task::spawn_blocking(move || sweep_once(&pass_claims, &pass_settings))
                    .await
                    .map_err(|e| crate::error::CoordError::Storage(format!("sweep task failed: {}", e)))?;
                match outcome {
                    Ok(_) => {}
                    Err(err) if err.is_transient() => {
                        warn!(error = %err, "Sweep pass skipped, store busy");
                    }
                    Err(err) => return Err(err),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Stale claim sweeper stopping");
                return Ok(());
            }
        }
    }
}
