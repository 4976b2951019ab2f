//! Provider synchronizer: the mirroring policy between a [`CapiProvider`] and
//! its operator [`Provider`].
//!
//! Direction of updates:
//! - spec → down (source spec overwrites destination spec)
//! - up ← status (destination status and conditions merge into the source)
//!
//! On top of plain mirroring it derives the source [`Phase`] and issues two
//! time-gated triggers: a debounced rollout (clearing the operator's applied
//! spec hash) and a TTL-gated refresh to the latest provider version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use mirror_core::conditions::{
    ConditionStatus, CHECK_LATEST_VERSION_TIME, LAST_APPLIED_CONFIGURATION_TIME,
    PREFLIGHT_CHECK_PASSED, PROVIDER_INSTALLED,
};
use mirror_core::{CapiProvider, Phase, Provider, TemplateRegistry};

use crate::client::ResourceClient;
use crate::config::{SyncConfig, APPLIED_SPEC_HASH_ANNOTATION};
use crate::error::SyncError;
use crate::synchronizer::{Synchronize, Synchronizer};

pub const ROLLOUT_REASON: &str = "Requesting infrastructure rollout";
pub const LATEST_VERSION_REASON: &str = "Requesting latest version rollout";

pub struct ProviderSync<'a, C: ?Sized> {
    inner: Synchronizer<'a, C>,
    config: &'a SyncConfig,
}

impl<'a, C: ResourceClient + ?Sized> ProviderSync<'a, C> {
    /// Resolve the destination template for `source`.
    ///
    /// Fails with [`SyncError::UnknownProviderType`] before touching anything
    /// when the provider type is not registered.
    pub fn new(
        client: &'a C,
        source: &'a mut CapiProvider,
        registry: &TemplateRegistry,
        config: &'a SyncConfig,
    ) -> Result<Self, SyncError> {
        let destination =
            registry
                .instantiate(source)
                .ok_or_else(|| SyncError::UnknownProviderType {
                    provider_type: source.spec.provider_type.to_string(),
                    key: source.key(),
                })?;

        Ok(Self {
            inner: Synchronizer::new(client, source, destination),
            config,
        })
    }

    pub fn source(&self) -> &CapiProvider {
        self.inner.source
    }

    pub fn destination(&self) -> &Provider {
        &self.inner.destination
    }

    pub fn destination_mut(&mut self) -> &mut Provider {
        &mut self.inner.destination
    }

    pub fn into_destination(self) -> Provider {
        self.inner.destination
    }

    /// Run a full sync pass as of `now`.
    ///
    /// Only the latest-version refresh talks to the client, and it runs last.
    pub async fn sync_at(&mut self, now: DateTime<Utc>) -> Result<(), SyncError> {
        self.sync_objects_at(now);
        self.update_latest_version_at(now).await
    }

    /// In-memory part of a sync pass: spec down, status up, phase, rollout.
    pub fn sync_objects_at(&mut self, now: DateTime<Utc>) {
        let source = &mut *self.inner.source;
        let destination = &mut self.inner.destination;

        destination.spec = source.spec.provider.clone();

        let old_conditions = source.status.provider.conditions.clone();
        let new_conditions = destination.status.conditions.clone();
        source.status.provider = destination.status.clone();
        source.status.provider.conditions = old_conditions;
        for condition in new_conditions {
            source.status.provider.conditions.set_at(condition, now);
        }

        self.sync_phase();
        self.rollout_infrastructure_at(now);
    }

    fn sync_phase(&mut self) {
        let status = &mut self.inner.source.status;
        let conditions = &status.provider.conditions;

        status.phase = if conditions.is_true(PROVIDER_INSTALLED) {
            Phase::Ready
        } else if conditions.is_false(PREFLIGHT_CHECK_PASSED) {
            Phase::Failed
        } else {
            Phase::Provisioning
        };
    }

    fn rollout_infrastructure_at(&mut self, now: DateTime<Utc>) {
        let key = self.inner.source.key();
        let conditions = &mut self.inner.source.status.provider.conditions;

        if let Some(last_applied) = conditions.get(LAST_APPLIED_CONFIGURATION_TIME) {
            if within(last_applied.last_transition_time, self.config.rollout_debounce(), now) {
                debug!("rollout for {key} debounced");
                return;
            }
        }

        conditions.mark_unknown_at(LAST_APPLIED_CONFIGURATION_TIME, ROLLOUT_REASON, "", now);

        self.inner
            .destination
            .metadata
            .annotations
            .insert(APPLIED_SPEC_HASH_ANNOTATION.to_string(), String::new());

        conditions.mark_true_at(LAST_APPLIED_CONFIGURATION_TIME, now);
        info!("requested rollout of {} {key}", self.inner.destination.kind);
    }

    async fn update_latest_version_at(&mut self, now: DateTime<Utc>) -> Result<(), SyncError> {
        // Pinned versions are never overridden.
        if !self.inner.source.spec.provider.version.is_empty() {
            return Ok(());
        }

        let key = self.inner.source.key();
        let conditions = &mut self.inner.source.status.provider.conditions;

        if let Some(last_check) = conditions.get(CHECK_LATEST_VERSION_TIME) {
            if last_check.status == ConditionStatus::True
                && within(last_check.last_transition_time, self.config.version_check_ttl(), now)
            {
                debug!("latest version check for {key} still fresh");
                return Ok(());
            }
        }

        // Patch against the stored copy so only the version reset is sent.
        let patch_base = self
            .inner
            .fetched
            .clone()
            .unwrap_or_else(|| self.inner.destination.clone());
        let mut patch_target = patch_base.clone();
        patch_target.spec.version.clear();
        self.inner.destination.spec.version.clear();

        // Re-arm through Unknown so a stale True gets a fresh transition time.
        conditions.mark_unknown_at(CHECK_LATEST_VERSION_TIME, LATEST_VERSION_REASON, "", now);
        conditions.mark_true_at(CHECK_LATEST_VERSION_TIME, now);

        let result = self
            .inner
            .client
            .patch(&patch_target, &patch_base)
            .await;

        match result {
            Ok(()) => {
                self.inner.fetched = Some(patch_target);
                info!("requested latest version of {} {key}", self.inner.destination.kind);
                Ok(())
            }
            Err(e) => {
                self.inner.source.status.provider.conditions.mark_unknown_at(
                    CHECK_LATEST_VERSION_TIME,
                    LATEST_VERSION_REASON,
                    "",
                    now,
                );
                if e.is_not_found() {
                    warn!("latest version patch for {key} skipped: {e}");
                    return Ok(());
                }
                Err(e.into())
            }
        }
    }
}

/// True while `now` is still inside `window` starting at `since`.
fn within(since: DateTime<Utc>, window: chrono::Duration, now: DateTime<Utc>) -> bool {
    since
        .checked_add_signed(window)
        .map_or(true, |until| until > now)
}

#[async_trait]
impl<'a, C: ResourceClient + ?Sized> Synchronize for ProviderSync<'a, C> {
    async fn get(&mut self) -> Result<(), SyncError> {
        self.inner.get().await
    }

    async fn sync(&mut self) -> Result<(), SyncError> {
        self.sync_at(Utc::now()).await
    }

    async fn apply(&mut self) -> Result<(), SyncError> {
        self.inner.apply().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mirror_core::conditions::Condition;
    use mirror_core::{ObjectMeta, ProviderKind};

    use crate::client::MemoryClient;
    use crate::error::ClientError;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn source(version: &str) -> CapiProvider {
        let mut source = CapiProvider::default();
        source.metadata = ObjectMeta {
            name: "docker".into(),
            namespace: "capi-system".into(),
            ..Default::default()
        };
        source.spec.provider_type = "infrastructure".into();
        source.spec.provider.version = version.into();
        source
    }

    fn stored_destination(source: &CapiProvider) -> Provider {
        TemplateRegistry::new().instantiate(source).expect("template")
    }

    fn condition(type_: &str, status: ConditionStatus) -> Condition {
        Condition::new(type_, status, "", "")
    }

    #[test]
    fn unknown_provider_type_fails_fast() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("");
        source.spec.provider_type = "helm".into();
        let before = source.clone();

        let err = ProviderSync::new(&client, &mut source, &TemplateRegistry::new(), &config)
            .err()
            .expect("unknown type must fail");
        assert!(matches!(err, SyncError::UnknownProviderType { .. }));
        assert_eq!(source, before);
    }

    #[test]
    fn spec_is_propagated_down() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("v1.9.0");
        source
            .spec
            .provider
            .variables
            .insert("EXP_CLUSTER_RESOURCE_SET".into(), "true".into());

        let registry = TemplateRegistry::new();
        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.destination_mut().spec.version = "v0.1.0".into();
        sync.sync_objects_at(t0());

        assert_eq!(sync.destination().spec.version, "v1.9.0");
        assert_eq!(
            sync.destination().spec.variables.get("EXP_CLUSTER_RESOURCE_SET"),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn status_is_propagated_up_and_conditions_merged() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("v1.9.0");
        source
            .status
            .provider
            .conditions
            .set_at(condition("ManagedByUser", ConditionStatus::True), t0());

        let registry = TemplateRegistry::new();
        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        let destination = sync.destination_mut();
        destination.status.installed_version = Some("v1.9.0".into());
        destination
            .status
            .conditions
            .set_at(condition(PROVIDER_INSTALLED, ConditionStatus::True), t0());
        sync.sync_objects_at(t0());

        let status = &sync.source().status;
        assert_eq!(status.provider.installed_version.as_deref(), Some("v1.9.0"));
        assert!(status.provider.conditions.is_true("ManagedByUser"));
        assert!(status.provider.conditions.is_true(PROVIDER_INSTALLED));
        assert!(status.provider.conditions.is_true(LAST_APPLIED_CONFIGURATION_TIME));
        assert_eq!(status.phase, Phase::Ready);
    }

    #[test]
    fn unchanged_destination_condition_keeps_transition_time() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("v1.9.0");
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.destination_mut()
            .status
            .conditions
            .set_at(condition(PROVIDER_INSTALLED, ConditionStatus::True), t0());
        sync.sync_objects_at(t0());
        sync.sync_objects_at(t0() + Duration::minutes(10));

        let installed = sync
            .source()
            .status
            .provider
            .conditions
            .get(PROVIDER_INSTALLED)
            .unwrap();
        assert_eq!(installed.last_transition_time, t0());
    }

    #[test]
    fn phase_precedence() {
        let cases = [
            (Some(ConditionStatus::True), Some(ConditionStatus::False), Phase::Ready),
            (None, Some(ConditionStatus::False), Phase::Failed),
            (Some(ConditionStatus::False), Some(ConditionStatus::False), Phase::Failed),
            (None, None, Phase::Provisioning),
            (Some(ConditionStatus::Unknown), Some(ConditionStatus::True), Phase::Provisioning),
        ];
        let registry = TemplateRegistry::new();
        let config = SyncConfig::default();
        let client = MemoryClient::new();

        for (installed, preflight, expected) in cases {
            let mut source = source("v1");
            let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
            let conditions = &mut sync.destination_mut().status.conditions;
            if let Some(status) = installed {
                conditions.set_at(condition(PROVIDER_INSTALLED, status), t0());
            }
            if let Some(status) = preflight {
                conditions.set_at(condition(PREFLIGHT_CHECK_PASSED, status), t0());
            }
            sync.sync_objects_at(t0());
            assert_eq!(
                sync.source().status.phase,
                expected,
                "installed={installed:?} preflight={preflight:?}"
            );
        }
    }

    #[test]
    fn phase_is_recomputed_not_sticky() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("v1");
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.destination_mut()
            .status
            .conditions
            .set_at(condition(PREFLIGHT_CHECK_PASSED, ConditionStatus::False), t0());
        sync.sync_objects_at(t0());
        assert_eq!(sync.source().status.phase, Phase::Failed);

        sync.destination_mut()
            .status
            .conditions
            .set_at(condition(PREFLIGHT_CHECK_PASSED, ConditionStatus::True), t0());
        sync.sync_objects_at(t0() + Duration::seconds(5));
        assert_eq!(sync.source().status.phase, Phase::Provisioning);
    }

    #[test]
    fn rollout_clears_hash_and_is_debounced() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("v1");
        let registry = TemplateRegistry::new();
        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();

        sync.sync_objects_at(t0());
        let annotations = &sync.destination().metadata.annotations;
        assert_eq!(annotations.get(APPLIED_SPEC_HASH_ANNOTATION), Some(&String::new()));

        // The operator records a hash again; 10s later the rollout must not fire.
        sync.destination_mut()
            .metadata
            .annotations
            .insert(APPLIED_SPEC_HASH_ANNOTATION.into(), "abc".into());
        sync.sync_objects_at(t0() + Duration::seconds(10));
        assert_eq!(
            sync.destination().metadata.annotations.get(APPLIED_SPEC_HASH_ANNOTATION),
            Some(&"abc".to_string())
        );

        sync.sync_objects_at(t0() + Duration::seconds(70));
        assert_eq!(
            sync.destination().metadata.annotations.get(APPLIED_SPEC_HASH_ANNOTATION),
            Some(&String::new())
        );
        let last_applied = sync
            .source()
            .status
            .provider
            .conditions
            .get(LAST_APPLIED_CONFIGURATION_TIME)
            .unwrap();
        assert_eq!(last_applied.status, ConditionStatus::True);
        assert_eq!(last_applied.last_transition_time, t0() + Duration::seconds(70));
    }

    #[tokio::test]
    async fn unpinned_version_is_refreshed_and_patched() {
        let mut source = source("");
        let mut stored = stored_destination(&source);
        stored.spec.version = "v1.8.0".into();
        let client = MemoryClient::with_objects([stored]);
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.get().await.expect("get");
        sync.sync_at(t0()).await.expect("sync");

        assert!(sync.destination().spec.version.is_empty());
        assert!(sync
            .source()
            .status
            .provider
            .conditions
            .is_true(CHECK_LATEST_VERSION_TIME));

        // The reset reaches the store through the patch itself, before apply.
        assert_eq!(
            client.patches().await,
            vec![serde_json::json!({"spec": {"version": null}})]
        );
        let stored = client
            .stored(ProviderKind::Infrastructure, &sync.destination().key())
            .await
            .expect("stored");
        assert!(stored.spec.version.is_empty());
    }

    #[tokio::test]
    async fn version_patch_leaves_other_local_edits_out() {
        let mut source = source("");
        source.spec.provider.variables.insert("A".into(), "1".into());
        let mut stored = stored_destination(&source);
        stored.spec.version = "v1.8.0".into();
        let client = MemoryClient::with_objects([stored]);
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.get().await.expect("get");
        sync.sync_at(t0()).await.expect("sync");

        // Variables and the rollout annotation travel with apply, not the patch.
        let stored = client
            .stored(ProviderKind::Infrastructure, &sync.destination().key())
            .await
            .expect("stored");
        assert!(stored.spec.variables.is_empty());
        assert!(stored.metadata.annotations.is_empty());

        sync.apply().await.expect("apply");
        let stored = client
            .stored(ProviderKind::Infrastructure, &sync.destination().key())
            .await
            .expect("stored");
        assert_eq!(stored.spec.variables.get("A"), Some(&"1".to_string()));
        assert!(stored.spec.version.is_empty());
    }

    #[tokio::test]
    async fn pinned_version_is_never_touched() {
        let mut source = source("v1.2.3");
        let client = MemoryClient::with_objects([stored_destination(&source)]);
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        for offset in [0, 3600, 2 * 86400] {
            sync.sync_at(t0() + Duration::seconds(offset)).await.expect("sync");
        }

        assert_eq!(sync.destination().spec.version, "v1.2.3");
        assert!(sync
            .source()
            .status
            .provider
            .conditions
            .get(CHECK_LATEST_VERSION_TIME)
            .is_none());
        assert!(client.patches().await.is_empty());
    }

    #[tokio::test]
    async fn version_refresh_respects_ttl() {
        let mut source = source("");
        let client = MemoryClient::with_objects([stored_destination(&source)]);
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        for hours in [0, 1, 12, 23] {
            sync.sync_at(t0() + Duration::hours(hours)).await.expect("sync");
        }
        assert_eq!(client.patches().await.len(), 1);

        sync.sync_at(t0() + Duration::hours(25)).await.expect("sync");
        assert_eq!(client.patches().await.len(), 2);
        let check = sync
            .source()
            .status
            .provider
            .conditions
            .get(CHECK_LATEST_VERSION_TIME)
            .unwrap();
        assert_eq!(check.last_transition_time, t0() + Duration::hours(25));

        sync.sync_at(t0() + Duration::hours(26)).await.expect("sync");
        assert_eq!(client.patches().await.len(), 2);
    }

    #[tokio::test]
    async fn missing_destination_on_refresh_is_not_an_error() {
        let mut source = source("");
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        sync.sync_at(t0()).await.expect("not found is swallowed");

        let check = sync
            .source()
            .status
            .provider
            .conditions
            .get(CHECK_LATEST_VERSION_TIME)
            .unwrap();
        assert_eq!(check.status, ConditionStatus::Unknown);
        assert_eq!(check.reason, LATEST_VERSION_REASON);
    }

    struct BrokenClient;

    #[async_trait]
    impl ResourceClient for BrokenClient {
        async fn get(&self, _object: &mut Provider) -> Result<(), ClientError> {
            Ok(())
        }
        async fn create(&self, _object: &Provider) -> Result<(), ClientError> {
            Ok(())
        }
        async fn update(&self, _object: &Provider) -> Result<(), ClientError> {
            Ok(())
        }
        async fn patch(&self, _object: &Provider, _base: &Provider) -> Result<(), ClientError> {
            Err(ClientError::Json(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            ))
        }
    }

    #[tokio::test]
    async fn other_patch_failures_surface_and_mark_unknown() {
        let mut source = source("");
        let config = SyncConfig::default();
        let registry = TemplateRegistry::new();

        let mut sync = ProviderSync::new(&BrokenClient, &mut source, &registry, &config).unwrap();
        let err = sync.sync_at(t0()).await.unwrap_err();
        assert!(matches!(err, SyncError::Client(ClientError::Json(_))));
        assert!(sync
            .source()
            .status
            .provider
            .conditions
            .is_unknown(CHECK_LATEST_VERSION_TIME));

        // Unknown is not "fresh": the next pass retries.
        let _ = sync.sync_at(t0() + Duration::seconds(1)).await;
        assert!(sync
            .source()
            .status
            .provider
            .conditions
            .is_unknown(CHECK_LATEST_VERSION_TIME));
    }

    #[test]
    fn destination_kind_follows_template() {
        let client = MemoryClient::new();
        let config = SyncConfig::default();
        let mut source = source("");
        source.spec.provider_type = "ControlPlane".into();
        let registry = TemplateRegistry::new();
        let sync = ProviderSync::new(&client, &mut source, &registry, &config).unwrap();
        assert_eq!(sync.destination().kind, ProviderKind::ControlPlane);
    }
}
