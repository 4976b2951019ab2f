//! Error types for mirror-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use mirror_core::{ObjectKey, StoreError};

/// Failures reported by a [`ResourceClient`](crate::client::ResourceClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The addressed object does not exist.
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },

    /// `create` was called for an object that already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },

    /// The backing object store failed.
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// An object could not be converted to or from its patch document.
    #[error("patch encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No destination template is registered for the source's provider type.
    #[error("unknown provider type '{provider_type}' for {key}")]
    UnknownProviderType { provider_type: String, key: ObjectKey },

    /// A resource client call failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// An error from the object store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A reconciliation pass exceeded its deadline.
    #[error("sync of {key} timed out after {timeout:?}")]
    Timeout { key: ObjectKey, timeout: Duration },

    /// Settings file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings file is not valid YAML for [`SyncConfig`](crate::config::SyncConfig).
    #[error("failed to parse config at {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML rendering for dry-run diffs failed.
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SyncError {
    /// True when the underlying client reported a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Client(e) if e.is_not_found())
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
