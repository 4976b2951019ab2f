//! Error types for mirror-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ObjectKey;

/// All errors that can arise from object store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (permission denied, disk full, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse object at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.mirror/`.
    #[error("cannot determine home directory; set $HOME or pass --root")]
    HomeNotFound,

    /// No object file exists at the expected path.
    #[error("object not found at {path}")]
    NotFound { path: PathBuf },

    /// Namespace or name cannot be used as a single path segment.
    #[error("invalid object key '{key}': namespace and name must be plain path segments")]
    InvalidKey { key: ObjectKey },
}
