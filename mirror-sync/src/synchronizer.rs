//! Generic source → destination synchronizer.
//!
//! A [`Synchronizer`] pairs one borrowed source record with the destination
//! record resolved for it. Specializations (see [`ProviderSync`]) implement
//! [`Synchronize`] on top of it.
//!
//! [`ProviderSync`]: crate::provider_sync::ProviderSync

use async_trait::async_trait;
use tracing::{debug, info};

use mirror_core::{CapiProvider, OwnerReference, Provider};

use crate::client::ResourceClient;
use crate::error::SyncError;

/// One reconciliation pass over a source/destination pair.
///
/// Callers run `get`, then `sync`, then `apply`, and persist the source
/// record themselves afterwards.
#[async_trait]
pub trait Synchronize: Send {
    /// Load (or create) the destination record.
    async fn get(&mut self) -> Result<(), SyncError>;

    /// Propagate state between the two records.
    async fn sync(&mut self) -> Result<(), SyncError>;

    /// Persist the destination record.
    async fn apply(&mut self) -> Result<(), SyncError>;
}

pub struct Synchronizer<'a, C: ?Sized> {
    pub(crate) client: &'a C,
    pub source: &'a mut CapiProvider,
    pub destination: Provider,
    /// Destination as last read from (or written to) the client by `get`.
    pub(crate) fetched: Option<Provider>,
}

impl<'a, C: ResourceClient + ?Sized> Synchronizer<'a, C> {
    /// `destination` is the empty template the stored record is loaded into.
    pub fn new(client: &'a C, source: &'a mut CapiProvider, destination: Provider) -> Self {
        Self {
            client,
            source,
            destination,
            fetched: None,
        }
    }

    /// Stored copy of the destination seen by `get`, before any local edits.
    pub fn fetched(&self) -> Option<&Provider> {
        self.fetched.as_ref()
    }

    /// Fetch the destination record, creating it from the template when absent.
    pub async fn get(&mut self) -> Result<(), SyncError> {
        match self.client.get(&mut self.destination).await {
            Ok(()) => {
                debug!("loaded {} {}", self.destination.kind, self.destination.key());
                self.fetched = Some(self.destination.clone());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.set_owner();
                self.client.create(&self.destination).await?;
                self.fetched = Some(self.destination.clone());
                info!(
                    "created {} {} for {} {}",
                    self.destination.kind,
                    self.destination.key(),
                    CapiProvider::KIND,
                    self.source.key()
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the destination record back, owned by the source.
    ///
    /// Falls back to `create` if the record disappeared since `get`.
    pub async fn apply(&mut self) -> Result<(), SyncError> {
        self.set_owner();
        match self.client.update(&self.destination).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                self.client.create(&self.destination).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_owner(&mut self) {
        let owner = OwnerReference {
            kind: CapiProvider::KIND.to_string(),
            name: self.source.metadata.name.clone(),
        };
        let owners = &mut self.destination.metadata.owner_references;
        if !owners.contains(&owner) {
            owners.push(owner);
        }
    }
}
