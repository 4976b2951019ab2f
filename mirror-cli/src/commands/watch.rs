//! `mirror watch` — periodic reconciliation until interrupted.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use mirror_core::TemplateRegistry;
use mirror_sync::pipeline::{self, SyncScope};
use mirror_sync::SyncConfig;

use super::{runtime, GlobalArgs};

/// Arguments for `mirror watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between passes.
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Stop after this many passes instead of running until ctrl-c.
    #[arg(long)]
    pub passes: Option<u64>,
}

impl WatchArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let root = global.root()?;
        let config = global.load_config(&root)?;
        runtime()?.block_on(watch(
            &root,
            &config,
            Duration::from_secs(self.interval),
            self.passes,
        ))
    }
}

async fn watch(
    root: &Path,
    config: &SyncConfig,
    period: Duration,
    passes: Option<u64>,
) -> Result<()> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut completed = 0u64;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("ctrl-c handler failed")?;
                info!("received ctrl-c, stopping watch");
                return Ok(());
            }
            _ = interval.tick() => {
                run_pass(root, config).await;
                completed += 1;
                if passes.is_some_and(|limit| completed >= limit) {
                    return Ok(());
                }
            }
        }
    }
}

/// Failures are logged and retried on the next tick.
async fn run_pass(root: &Path, config: &SyncConfig) {
    match pipeline::run(root, &SyncScope::All, TemplateRegistry::builtin(), config, false).await {
        Ok(results) => {
            for result in results.iter().filter(|r| r.is_ok()) {
                info!("{} is {}", result.key, result.phase);
            }
        }
        Err(e) => warn!("watch pass failed: {e}"),
    }
}
