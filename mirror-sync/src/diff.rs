//! Unified diffs of stored records for `mirror sync --dry-run`.

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use crate::SyncError;

/// Difference between the stored and the would-be-stored copy of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDiff {
    /// Store path of the record, relative to the store root.
    pub path: PathBuf,
    pub unified_diff: String,
}

/// Diff the YAML rendering of `before` against `after`.
///
/// `None` on either side stands for a record that does not exist. Returns
/// `None` when both renderings are identical.
pub fn diff_records<T: Serialize>(
    path: &Path,
    before: Option<&T>,
    after: Option<&T>,
) -> Result<Option<ObjectDiff>, SyncError> {
    let old = render(before)?;
    let new = render(after)?;
    if old == new {
        return Ok(None);
    }

    let old_header = if before.is_some() {
        format!("a/{}", path.display())
    } else {
        "/dev/null".to_string()
    };
    let new_header = format!("b/{}", path.display());
    let unified = TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(Some(ObjectDiff {
        path: path.to_path_buf(),
        unified_diff: unified,
    }))
}

fn render<T: Serialize>(record: Option<&T>) -> Result<String, SyncError> {
    match record {
        Some(record) => Ok(serde_yaml::to_string(record)?),
        None => Ok(String::new()),
    }
}
