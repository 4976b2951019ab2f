//! Reconcile pipeline shared by `mirror sync` and `mirror watch`.
//!
//! [`reconcile_at`] runs one `get → sync → apply` pass for a single source
//! record under the configured deadline. [`run_at`] drives it over every
//! source in a file store and persists the updated source records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use mirror_core::{
    store, CapiProvider, ObjectKey, Phase, Provider, ProviderKind, TemplateRegistry,
};

use crate::client::{FileClient, MemoryClient, ResourceClient};
use crate::config::SyncConfig;
use crate::diff::{diff_records, ObjectDiff};
use crate::provider_sync::ProviderSync;
use crate::synchronizer::Synchronize;
use crate::SyncError;

/// Scope for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncScope {
    /// Every source record in the store.
    All,
    /// A single source record.
    Provider(ObjectKey),
}

/// Outcome of reconciling one source record.
///
/// A failed pass is reported here rather than aborting the run; the next pass
/// retries it.
#[derive(Debug)]
pub struct ReconcileResult {
    pub key: ObjectKey,
    /// Destination kind, `None` when the provider type is unknown.
    pub kind: Option<ProviderKind>,
    pub phase: Phase,
    pub error: Option<SyncError>,
    /// Populated in dry-run mode only.
    pub diffs: Vec<ObjectDiff>,
}

impl ReconcileResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// ---------------------------------------------------------------------------
// Single pass
// ---------------------------------------------------------------------------

/// One reconciliation pass for `source` as of now.
pub async fn reconcile<C: ResourceClient + ?Sized>(
    client: &C,
    source: &mut CapiProvider,
    registry: &TemplateRegistry,
    config: &SyncConfig,
) -> Result<Provider, SyncError> {
    reconcile_at(client, source, registry, config, Utc::now()).await
}

/// One reconciliation pass for `source` as of `now`.
///
/// The whole pass is bounded by `config.sync_timeout`. When the deadline
/// fires, the in-flight client call is dropped and `source` keeps whatever
/// was already written into it. The caller persists `source` either way.
pub async fn reconcile_at<C: ResourceClient + ?Sized>(
    client: &C,
    source: &mut CapiProvider,
    registry: &TemplateRegistry,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> Result<Provider, SyncError> {
    let key = source.key();
    let pass = async {
        let mut sync = ProviderSync::new(client, source, registry, config)?;
        sync.get().await?;
        sync.sync_at(now).await?;
        sync.apply().await?;
        Ok::<_, SyncError>(sync.into_destination())
    };

    match tokio::time::timeout(config.sync_timeout, pass).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout {
            key,
            timeout: config.sync_timeout,
        }),
    }
}

// ---------------------------------------------------------------------------
// Store-wide run
// ---------------------------------------------------------------------------

/// Reconcile every source in `scope` against the file store at `root`.
pub async fn run(
    root: &Path,
    scope: &SyncScope,
    registry: &TemplateRegistry,
    config: &SyncConfig,
    dry_run: bool,
) -> Result<Vec<ReconcileResult>, SyncError> {
    run_at(root, scope, registry, config, dry_run, Utc::now()).await
}

/// [`run`] with an explicit clock.
///
/// Errors out only when the sources themselves cannot be listed; per-source
/// failures land in the returned results.
pub async fn run_at(
    root: &Path,
    scope: &SyncScope,
    registry: &TemplateRegistry,
    config: &SyncConfig,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<Vec<ReconcileResult>, SyncError> {
    // Keyed by the file each record was read from, so it is written back there.
    let sources = match scope {
        SyncScope::All => store::list_source_entries_at(root)?,
        SyncScope::Provider(key) => vec![(key.clone(), store::load_source_at(root, key)?)],
    };

    let mut results = Vec::with_capacity(sources.len());
    for (key, source) in sources {
        let result = if dry_run {
            preview_one(root, key, source, registry, config, now).await
        } else {
            reconcile_one(root, key, source, registry, config, now).await
        };
        if let Some(e) = &result.error {
            warn!("reconcile of {} failed: {e}", result.key);
        }
        results.push(result);
    }

    info!(
        "reconciled {} source(s), {} failed",
        results.len(),
        results.iter().filter(|r| !r.is_ok()).count()
    );
    Ok(results)
}

async fn reconcile_one(
    root: &Path,
    key: ObjectKey,
    mut source: CapiProvider,
    registry: &TemplateRegistry,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> ReconcileResult {
    let client = FileClient::new(root);
    let kind = registry.instantiate(&source).map(|p| p.kind);

    let mut error = reconcile_at(&client, &mut source, registry, config, now)
        .await
        .err();

    if let Err(e) = store::save_source_as_at(root, &key, &source) {
        error.get_or_insert(e.into());
    }

    ReconcileResult {
        key,
        kind,
        phase: source.status.phase,
        error,
        diffs: Vec::new(),
    }
}

/// Run the pass against an in-memory copy of the store and diff the result.
async fn preview_one(
    root: &Path,
    key: ObjectKey,
    mut source: CapiProvider,
    registry: &TemplateRegistry,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> ReconcileResult {
    let before_source = source.clone();
    let template = registry.instantiate(&source);
    let kind = template.as_ref().map(|p| p.kind);

    let mut before_destination = None;
    if let Some(template) = &template {
        match store::load_provider_at(root, template.kind, &template.key()) {
            Ok(stored) => before_destination = Some(stored),
            Err(mirror_core::StoreError::NotFound { .. }) => {}
            Err(e) => {
                return ReconcileResult {
                    key,
                    kind,
                    phase: source.status.phase,
                    error: Some(e.into()),
                    diffs: Vec::new(),
                }
            }
        }
    }

    let client = MemoryClient::with_objects(before_destination.clone());
    let mut error = reconcile_at(&client, &mut source, registry, config, now)
        .await
        .err();

    let mut diffs = Vec::new();
    if let Some(template) = &template {
        let after_destination = client.stored(template.kind, &template.key()).await;
        let path = relative(
            root,
            store::provider_path_at(root, template.kind, &template.key()),
        );
        match diff_records(&path, before_destination.as_ref(), after_destination.as_ref()) {
            Ok(Some(diff)) => diffs.push(diff),
            Ok(None) => {}
            Err(e) => {
                error.get_or_insert(e);
            }
        }
    }

    let path = relative(root, store::source_path_at(root, &key));
    match diff_records(&path, Some(&before_source), Some(&source)) {
        Ok(Some(diff)) => diffs.push(diff),
        Ok(None) => {}
        Err(e) => {
            error.get_or_insert(e);
        }
    }

    ReconcileResult {
        key,
        kind,
        phase: source.status.phase,
        error,
        diffs,
    }
}

fn relative(root: &Path, path: PathBuf) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or(path)
}
