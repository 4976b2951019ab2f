//! Provider template registry.
//!
//! Maps a source record's provider type to an empty destination prototype of
//! the matching [`ProviderKind`]. The table is built once from the closed kind
//! set and never mutated afterwards.

use std::sync::OnceLock;

use crate::types::{CapiProvider, ObjectMeta, Provider, ProviderKind};

/// Immutable lookup table of destination prototypes.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: Vec<Provider>,
}

impl TemplateRegistry {
    /// Registry with one prototype per known provider kind.
    pub fn new() -> Self {
        Self::with_kinds(&ProviderKind::ALL)
    }

    /// Registry restricted to `kinds`.
    pub fn with_kinds(kinds: &[ProviderKind]) -> Self {
        Self {
            templates: kinds.iter().map(|kind| Provider::new(*kind)).collect(),
        }
    }

    /// Process-wide registry of all built-in kinds.
    pub fn builtin() -> &'static TemplateRegistry {
        static BUILTIN: OnceLock<TemplateRegistry> = OnceLock::new();
        BUILTIN.get_or_init(TemplateRegistry::new)
    }

    /// Find the prototype registered for `provider_type` (case-insensitive).
    pub fn resolve(&self, provider_type: &str) -> Option<&Provider> {
        let wanted = provider_type.to_ascii_lowercase();
        self.templates
            .iter()
            .find(|template| template.kind.type_name() == wanted)
    }

    /// Build an empty, correctly named destination record for `source`.
    ///
    /// Returns `None` when the source's provider type is not registered.
    pub fn instantiate(&self, source: &CapiProvider) -> Option<Provider> {
        let template = self.resolve(&source.spec.provider_type.0)?;

        let name = if source.spec.name.is_empty() {
            source.metadata.name.clone()
        } else {
            source.spec.name.clone()
        };

        let mut destination = template.clone();
        destination.metadata = ObjectMeta {
            name,
            namespace: source.metadata.namespace.clone(),
            ..ObjectMeta::default()
        };
        Some(destination)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.templates.iter().map(|template| template.kind)
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
