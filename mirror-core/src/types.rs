//! Domain types for mirrored provider records.
//!
//! Two records describe the same provider: the user-owned [`CapiProvider`]
//! (source of truth) and the operator-owned [`Provider`] (destination).
//! All types are serializable/deserializable via serde + serde_yaml, using the
//! camelCase field names the orchestration API uses.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::conditions::Conditions;

/// Namespace assumed when a key or record does not carry one.
pub const DEFAULT_NAMESPACE: &str = "default";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Provider type discriminator as written by the user (`infrastructure`,
/// `controlPlane`, ...).
///
/// Kept as a free-form string so an unrecognised value survives parsing and is
/// rejected by the template registry instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ProviderType(pub String);

impl ProviderType {
    /// Lowercased form used for registry lookups.
    pub fn normalized(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProviderType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProviderType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Namespaced identity of a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Whether both parts are usable as single path segments.
    pub fn is_valid(&self) -> bool {
        is_valid_segment(&self.namespace) && is_valid_segment(&self.name)
    }
}

fn is_valid_segment(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = String;

    /// Accepts `namespace/name`, or a bare `name` in the default namespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, name) = match s.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => (DEFAULT_NAMESPACE, s),
        };
        let key = Self::new(namespace, name);
        if !key.is_valid() {
            return Err(format!("invalid object key '{s}'; expected <namespace>/<name>"));
        }
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Coarse lifecycle phase of a source record, recomputed on every sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Phase {
    #[default]
    Provisioning,
    Ready,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provisioning => write!(f, "Provisioning"),
            Phase::Ready => write!(f, "Ready"),
            Phase::Failed => write!(f, "Failed"),
        }
    }
}

/// The closed set of destination record kinds the downstream operator installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "CoreProvider")]
    Core,
    #[serde(rename = "BootstrapProvider")]
    Bootstrap,
    #[serde(rename = "ControlPlaneProvider")]
    ControlPlane,
    #[serde(rename = "InfrastructureProvider")]
    Infrastructure,
    #[serde(rename = "AddonProvider")]
    Addon,
    #[serde(rename = "IPAMProvider")]
    Ipam,
    #[serde(rename = "RuntimeExtensionProvider")]
    RuntimeExtension,
}

impl ProviderKind {
    /// Every kind, in registration order.
    pub const ALL: [ProviderKind; 7] = [
        ProviderKind::Core,
        ProviderKind::Bootstrap,
        ProviderKind::ControlPlane,
        ProviderKind::Infrastructure,
        ProviderKind::Addon,
        ProviderKind::Ipam,
        ProviderKind::RuntimeExtension,
    ];

    /// Normalized (lowercase) provider type this kind is registered under.
    pub fn type_name(self) -> &'static str {
        match self {
            ProviderKind::Core => "core",
            ProviderKind::Bootstrap => "bootstrap",
            ProviderKind::ControlPlane => "controlplane",
            ProviderKind::Infrastructure => "infrastructure",
            ProviderKind::Addon => "addon",
            ProviderKind::Ipam => "ipam",
            ProviderKind::RuntimeExtension => "runtimeextension",
        }
    }

    /// API kind string, e.g. `InfrastructureProvider`.
    pub fn kind_name(self) -> &'static str {
        match self {
            ProviderKind::Core => "CoreProvider",
            ProviderKind::Bootstrap => "BootstrapProvider",
            ProviderKind::ControlPlane => "ControlPlaneProvider",
            ProviderKind::Infrastructure => "InfrastructureProvider",
            ProviderKind::Addon => "AddonProvider",
            ProviderKind::Ipam => "IPAMProvider",
            ProviderKind::RuntimeExtension => "RuntimeExtensionProvider",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Back-reference from a derived record to the record that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn key(&self) -> ObjectKey {
        let namespace = if self.namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        };
        ObjectKey::new(namespace, &self.name)
    }
}

// ---------------------------------------------------------------------------
// Shared spec / status
// ---------------------------------------------------------------------------

/// Where the operator fetches provider components from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci: Option<String>,
}

/// Installable provider configuration, shared by source and destination.
///
/// An empty `version` means "resolve to the latest release".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_config: Option<FetchConfig>,
}

/// Installer-reported state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub conditions: Conditions,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapiProviderSpec {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    /// Name for the destination record; falls back to the source name when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(flatten)]
    pub provider: ProviderSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapiProviderStatus {
    #[serde(default)]
    pub phase: Phase,
    #[serde(flatten)]
    pub provider: ProviderStatus,
}

/// Source record: user intent plus aggregated status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapiProvider {
    pub metadata: ObjectMeta,
    pub spec: CapiProviderSpec,
    #[serde(default)]
    pub status: CapiProviderStatus,
}

impl CapiProvider {
    pub const KIND: &'static str = "CAPIProvider";

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

/// Destination record: the operator's installable provider object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub kind: ProviderKind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ProviderSpec,
    #[serde(default)]
    pub status: ProviderStatus,
}

impl Provider {
    /// Empty prototype of the given kind.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            metadata: ObjectMeta::default(),
            spec: ProviderSpec::default(),
            status: ProviderStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
