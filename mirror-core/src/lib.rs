//! Mirror core library — provider records, conditions, templates, object store.
//!
//! - [`types`] — source/destination records and their metadata
//! - [`conditions`] — type-unique condition store
//! - [`template`] — provider type → destination prototype registry
//! - [`store`] — YAML object store on disk
//! - [`error`] — [`StoreError`]

pub mod conditions;
pub mod error;
pub mod store;
pub mod template;
pub mod types;

pub use conditions::{Condition, ConditionStatus, Conditions};
pub use error::StoreError;
pub use template::TemplateRegistry;
pub use types::{
    CapiProvider, CapiProviderSpec, CapiProviderStatus, FetchConfig, ObjectKey, ObjectMeta,
    OwnerReference, Phase, Provider, ProviderKind, ProviderSpec, ProviderStatus, ProviderType,
};
