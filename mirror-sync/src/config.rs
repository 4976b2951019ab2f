//! Sync engine settings.
//!
//! Loaded once at startup (see [`load_at`]) and passed by reference into every
//! reconciliation pass.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};

/// File name looked up under the store root when no explicit path is given.
pub const CONFIG_FILE: &str = "config.yaml";

/// Annotation the operator stores its last applied spec hash under.
/// An empty value forces a redeploy on the next operator pass.
pub const APPLIED_SPEC_HASH_ANNOTATION: &str = "operator.cluster.x-k8s.io/applied-spec-hash";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Minimum spacing between two forced rollouts of the same provider.
    #[serde(with = "humantime_serde")]
    pub rollout_debounce: Duration,
    /// How long a latest-version refresh stays fresh.
    #[serde(with = "humantime_serde")]
    pub version_check_ttl: Duration,
    /// Deadline for one reconciliation pass, including client round trips.
    #[serde(with = "humantime_serde")]
    pub sync_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rollout_debounce: Duration::from_secs(60),
            version_check_ttl: Duration::from_secs(24 * 60 * 60),
            sync_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    pub fn rollout_debounce(&self) -> chrono::Duration {
        to_chrono(self.rollout_debounce)
    }

    pub fn version_check_ttl(&self) -> chrono::Duration {
        to_chrono(self.version_check_ttl)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// `<root>/config.yaml`
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Load settings from `path`. Missing fields take their defaults.
pub fn load_at(path: &Path) -> Result<SyncConfig, SyncError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| SyncError::Config {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `<root>/config.yaml` if present, defaults otherwise.
pub fn load_or_default_at(root: &Path) -> Result<SyncConfig, SyncError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Ok(SyncConfig::default());
    }
    load_at(&path)
}

/// Durations as human-readable strings (`30s`, `1m`, `1day`).
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_operator_windows() {
        let config = SyncConfig::default();
        assert_eq!(config.rollout_debounce(), chrono::Duration::minutes(1));
        assert_eq!(config.version_check_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let root = TempDir::new().unwrap();
        assert_eq!(load_or_default_at(root.path()).unwrap(), SyncConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let root = TempDir::new().unwrap();
        std::fs::write(
            config_path_at(root.path()),
            "rolloutDebounce: 5s\nsyncTimeout: 2m 30s\n",
        )
        .unwrap();
        let config = load_or_default_at(root.path()).unwrap();
        assert_eq!(config.rollout_debounce, Duration::from_secs(5));
        assert_eq!(config.sync_timeout, Duration::from_secs(150));
        assert_eq!(config.version_check_ttl, SyncConfig::default().version_check_ttl);
    }

    #[test]
    fn malformed_file_reports_path() {
        let root = TempDir::new().unwrap();
        let path = config_path_at(root.path());
        std::fs::write(&path, "rolloutDebounce: soon\n").unwrap();
        let err = load_at(&path).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn bare_numbers_are_rejected() {
        let root = TempDir::new().unwrap();
        let path = config_path_at(root.path());
        std::fs::write(&path, "rolloutDebounce: 60\n").unwrap();
        assert!(matches!(load_at(&path), Err(SyncError::Config { .. })));
    }

    #[test]
    fn roundtrip_as_human_durations() {
        let yaml = serde_yaml::to_string(&SyncConfig::default()).unwrap();
        assert!(yaml.contains("rolloutDebounce: 1m"));
        assert!(yaml.contains("versionCheckTtl: 1day"));
        assert!(yaml.contains("syncTimeout: 30s"));
        let back: SyncConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, SyncConfig::default());
    }
}
