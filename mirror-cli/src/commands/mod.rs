//! Subcommand implementations and the options they share.

pub mod status;
pub mod sync;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio::runtime::Runtime;

use mirror_core::store;
use mirror_sync::{config, SyncConfig};

/// Options accepted by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Object store root (default: ~/.mirror).
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Settings file (default: <root>/config.yaml when present).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => store::default_root().context("could not determine store root"),
        }
    }

    /// Settings are read once per invocation.
    pub fn load_config(&self, root: &std::path::Path) -> Result<SyncConfig> {
        match &self.config {
            Some(path) => config::load_at(path)
                .with_context(|| format!("failed to load config from {}", path.display())),
            None => config::load_or_default_at(root).context("failed to load config"),
        }
    }
}

pub fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Compact age such as `42s`, `5m`, `3h` or `2d`.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(timestamp).num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn ages_pick_the_largest_whole_unit() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_age(now - Duration::hours(3), now), "3h");
        assert_eq!(format_age(now - Duration::days(2), now), "2d");
        assert_eq!(format_age(now + Duration::minutes(1), now), "0s");
    }
}
