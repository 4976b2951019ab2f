//! Resource access for destination records.
//!
//! [`ResourceClient`] is the seam between the sync engine and wherever
//! destination records live. Two implementations ship here:
//! - [`MemoryClient`]: shared in-process map, used by tests and dry runs
//! - [`FileClient`]: the YAML object store under a root directory

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use mirror_core::{store, ObjectKey, Provider, ProviderKind, StoreError};

use crate::error::ClientError;
use crate::patch;

/// Get/create/update/patch of destination records by kind and key.
///
/// Implementations must be safe to share between concurrent reconciliations.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Replace `object` with the stored record of the same kind and key.
    async fn get(&self, object: &mut Provider) -> Result<(), ClientError>;

    async fn create(&self, object: &Provider) -> Result<(), ClientError>;

    /// Overwrite an existing record.
    async fn update(&self, object: &Provider) -> Result<(), ClientError>;

    /// Send only the fields of `object` that differ from `base`.
    async fn patch(&self, object: &Provider, base: &Provider) -> Result<(), ClientError>;
}

fn not_found(kind: ProviderKind, key: ObjectKey) -> ClientError {
    ClientError::NotFound {
        kind: kind.kind_name().to_string(),
        key,
    }
}

fn already_exists(kind: ProviderKind, key: ObjectKey) -> ClientError {
    ClientError::AlreadyExists {
        kind: kind.kind_name().to_string(),
        key,
    }
}

fn merge_into(stored: &Provider, patch_doc: &Value) -> Result<Provider, ClientError> {
    let mut doc = serde_json::to_value(stored)?;
    patch::apply(&mut doc, patch_doc);
    Ok(serde_json::from_value(doc)?)
}

// ---------------------------------------------------------------------------
// MemoryClient
// ---------------------------------------------------------------------------

type MemoryKey = (ProviderKind, ObjectKey);

/// In-process client. Every patch document it receives is kept for inspection.
#[derive(Debug, Default)]
pub struct MemoryClient {
    objects: RwLock<HashMap<MemoryKey, Provider>>,
    patches: Mutex<Vec<Value>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objects: impl IntoIterator<Item = Provider>) -> Self {
        let objects = objects
            .into_iter()
            .map(|object| ((object.kind, object.key()), object))
            .collect();
        Self {
            objects: RwLock::new(objects),
            patches: Mutex::new(Vec::new()),
        }
    }

    pub async fn insert(&self, object: Provider) {
        self.objects
            .write()
            .await
            .insert((object.kind, object.key()), object);
    }

    pub async fn remove(&self, kind: ProviderKind, key: &ObjectKey) -> Option<Provider> {
        self.objects.write().await.remove(&(kind, key.clone()))
    }

    pub async fn stored(&self, kind: ProviderKind, key: &ObjectKey) -> Option<Provider> {
        self.objects.read().await.get(&(kind, key.clone())).cloned()
    }

    /// Patch documents received so far, oldest first.
    pub async fn patches(&self) -> Vec<Value> {
        self.patches.lock().await.clone()
    }
}

#[async_trait]
impl ResourceClient for MemoryClient {
    async fn get(&self, object: &mut Provider) -> Result<(), ClientError> {
        let key = object.key();
        match self.objects.read().await.get(&(object.kind, key.clone())) {
            Some(stored) => {
                *object = stored.clone();
                Ok(())
            }
            None => Err(not_found(object.kind, key)),
        }
    }

    async fn create(&self, object: &Provider) -> Result<(), ClientError> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&(object.kind, key.clone())) {
            return Err(already_exists(object.kind, key));
        }
        objects.insert((object.kind, key), object.clone());
        Ok(())
    }

    async fn update(&self, object: &Provider) -> Result<(), ClientError> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        match objects.get_mut(&(object.kind, key.clone())) {
            Some(stored) => {
                *stored = object.clone();
                Ok(())
            }
            None => Err(not_found(object.kind, key)),
        }
    }

    async fn patch(&self, object: &Provider, base: &Provider) -> Result<(), ClientError> {
        let key = object.key();
        let patch_doc = patch::diff_objects_of(base, object)?;
        self.patches.lock().await.push(patch_doc.clone());

        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get_mut(&(object.kind, key.clone())) else {
            return Err(not_found(object.kind, key));
        };
        *stored = merge_into(stored, &patch_doc)?;
        debug!("patched {} {key}", object.kind);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileClient
// ---------------------------------------------------------------------------

/// Client over the YAML object store rooted at `root`.
///
/// Store I/O runs on the blocking pool so a caller's deadline can still fire
/// while a read or write is stuck.
#[derive(Debug, Clone)]
pub struct FileClient {
    root: PathBuf,
}

impl FileClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, ClientError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(&root)).await?
    }
}

fn load_stored(root: &Path, kind: ProviderKind, key: &ObjectKey) -> Result<Provider, ClientError> {
    match store::load_provider_at(root, kind, key) {
        Ok(provider) => Ok(provider),
        Err(StoreError::NotFound { .. }) => Err(not_found(kind, key.clone())),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ResourceClient for FileClient {
    async fn get(&self, object: &mut Provider) -> Result<(), ClientError> {
        let (kind, key) = (object.kind, object.key());
        *object = self
            .blocking(move |root| load_stored(root, kind, &key))
            .await?;
        Ok(())
    }

    async fn create(&self, object: &Provider) -> Result<(), ClientError> {
        let object = object.clone();
        self.blocking(move |root| {
            let key = object.key();
            if store::provider_exists_at(root, object.kind, &key) {
                return Err(already_exists(object.kind, key));
            }
            store::save_provider_at(root, &object)?;
            Ok(())
        })
        .await
    }

    async fn update(&self, object: &Provider) -> Result<(), ClientError> {
        let object = object.clone();
        self.blocking(move |root| {
            let key = object.key();
            if !store::provider_exists_at(root, object.kind, &key) {
                return Err(not_found(object.kind, key));
            }
            store::save_provider_at(root, &object)?;
            Ok(())
        })
        .await
    }

    async fn patch(&self, object: &Provider, base: &Provider) -> Result<(), ClientError> {
        let (kind, key) = (object.kind, object.key());
        let patch_doc = patch::diff_objects_of(base, object)?;
        self.blocking(move |root| {
            let stored = load_stored(root, kind, &key)?;
            if patch::is_empty(&patch_doc) {
                return Ok(());
            }
            store::save_provider_at(root, &merge_into(&stored, &patch_doc)?)?;
            Ok(())
        })
        .await
    }
}
