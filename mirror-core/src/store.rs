//! YAML object store.
//!
//! # Storage layout
//!
//! ```text
//! <root>/                         (default: ~/.mirror)
//!   config.yaml                   (optional sync settings)
//!   objects/
//!     <namespace>/
//!       capiproviders/<name>.yaml (source records)
//!       <kind>s/<name>.yaml       (destination records, e.g. infrastructureproviders/)
//! ```
//!
//! Files are mode `0600`, directories `0700`. Every save goes through a
//! `.yaml.tmp` sibling and a rename so readers never see a partial file.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::types::{CapiProvider, ObjectKey, Provider, ProviderKind};

const SOURCE_DIR: &str = "capiproviders";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `~/.mirror`, derived from `dirs::home_dir()`.
pub fn default_root() -> Result<PathBuf, StoreError> {
    dirs::home_dir()
        .map(|home| home.join(".mirror"))
        .ok_or(StoreError::HomeNotFound)
}

/// `<root>/objects/`
pub fn objects_root(root: &Path) -> PathBuf {
    root.join("objects")
}

/// Directory name destination records of `kind` live under.
pub fn kind_dir(kind: ProviderKind) -> String {
    format!("{}s", kind.kind_name().to_ascii_lowercase())
}

/// `<root>/objects/<namespace>/capiproviders/<name>.yaml`; pure, no I/O.
pub fn source_path_at(root: &Path, key: &ObjectKey) -> PathBuf {
    object_path(root, SOURCE_DIR, key)
}

/// `<root>/objects/<namespace>/<kind>s/<name>.yaml`; pure, no I/O.
pub fn provider_path_at(root: &Path, kind: ProviderKind, key: &ObjectKey) -> PathBuf {
    object_path(root, &kind_dir(kind), key)
}

fn object_path(root: &Path, dir: &str, key: &ObjectKey) -> PathBuf {
    objects_root(root)
        .join(&key.namespace)
        .join(dir)
        .join(format!("{}.yaml", key.name))
}

/// Keys reach the filesystem only through here.
fn checked(key: &ObjectKey) -> Result<&ObjectKey, StoreError> {
    if key.is_valid() {
        Ok(key)
    } else {
        Err(StoreError::InvalidKey { key: key.clone() })
    }
}

// ---------------------------------------------------------------------------
// 2. Source records
// ---------------------------------------------------------------------------

/// Load one source record.
///
/// Returns `StoreError::NotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_source_at(root: &Path, key: &ObjectKey) -> Result<CapiProvider, StoreError> {
    load_yaml(source_path_at(root, checked(key)?))
}

/// Atomically save a source record under its own key.
pub fn save_source_at(root: &Path, source: &CapiProvider) -> Result<(), StoreError> {
    save_source_as_at(root, &source.key(), source)
}

/// Atomically save a source record to the file of `key`, whatever its metadata says.
pub fn save_source_as_at(
    root: &Path,
    key: &ObjectKey,
    source: &CapiProvider,
) -> Result<(), StoreError> {
    save_yaml(&source_path_at(root, checked(key)?), source)
}

/// Every source record, sorted by namespace then name.
pub fn list_sources_at(root: &Path) -> Result<Vec<CapiProvider>, StoreError> {
    Ok(list_source_entries_at(root)?
        .into_iter()
        .map(|(_, source)| source)
        .collect())
}

/// Walk `<root>/objects/*/capiproviders/*.yaml` and pair every source record
/// with the key of the file it was read from (namespace directory, file stem).
pub fn list_source_entries_at(root: &Path) -> Result<Vec<(ObjectKey, CapiProvider)>, StoreError> {
    let objects = objects_root(root);
    if !objects.exists() {
        return Ok(vec![]);
    }

    let mut namespaces: Vec<_> = std::fs::read_dir(&objects)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .collect();
    namespaces.sort_by_key(|e| e.file_name());

    let mut result = Vec::new();
    for ns_entry in namespaces {
        let dir = ns_entry.path().join(SOURCE_DIR);
        if !dir.is_dir() {
            continue;
        }

        let mut files: Vec<_> = std::fs::read_dir(&dir)?.filter_map(|e| e.ok()).collect();
        files.sort_by_key(|e| e.file_name());

        let namespace = ns_entry.file_name().to_string_lossy().into_owned();
        for file in files {
            let fname = file.file_name().to_string_lossy().into_owned();
            let Some(name) = fname.strip_suffix(".yaml") else {
                continue;
            };
            let key = ObjectKey::new(namespace.clone(), name);
            if !key.is_valid() {
                continue;
            }
            result.push((key, load_yaml(file.path())?));
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// 3. Destination records
// ---------------------------------------------------------------------------

pub fn load_provider_at(
    root: &Path,
    kind: ProviderKind,
    key: &ObjectKey,
) -> Result<Provider, StoreError> {
    load_yaml(provider_path_at(root, kind, checked(key)?))
}

/// Atomically save a destination record under its kind and key.
pub fn save_provider_at(root: &Path, provider: &Provider) -> Result<(), StoreError> {
    let key = provider.key();
    save_yaml(&provider_path_at(root, provider.kind, checked(&key)?), provider)
}

pub fn provider_exists_at(root: &Path, kind: ProviderKind, key: &ObjectKey) -> bool {
    key.is_valid() && provider_path_at(root, kind, key).exists()
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn load_yaml<T: DeserializeOwned>(path: PathBuf) -> Result<T, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");

    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
