//! # mirror-sync
//!
//! Mirrors `CAPIProvider` source records onto operator `Provider` records.
//!
//! - [`client`] — [`ResourceClient`] seam with in-memory and file-store clients
//! - [`synchronizer`] — generic fetch-or-create / apply pair
//! - [`provider_sync`] — spec down, status up, phase, rollout and version triggers
//! - [`pipeline`] — timed reconcile pass and store-wide runs
//!
//! Call [`pipeline::run`] to reconcile every source in a store, or
//! [`pipeline::reconcile`] to drive a single record against any client.

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod patch;
pub mod pipeline;
pub mod provider_sync;
pub mod synchronizer;

pub use client::{FileClient, MemoryClient, ResourceClient};
pub use config::SyncConfig;
pub use diff::ObjectDiff;
pub use error::{ClientError, SyncError};
pub use pipeline::{reconcile, run, ReconcileResult, SyncScope};
pub use provider_sync::ProviderSync;
pub use synchronizer::{Synchronize, Synchronizer};
