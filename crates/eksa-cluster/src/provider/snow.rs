//! Snow cluster reconciliation
//!
//! Resolves the SnowMachineConfigs a Cluster references, then hands the
//! spec to the shared compile-and-apply flow with the Snow provider.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, instrument};

use crate::client::get_resource;
use eksa_capi::SnowProvider;
use eksa_common::crd::{Cluster, Ref, SnowMachineConfig, SnowMachineConfigSpec};
use eksa_common::{Error, Result};

use super::{reconcile_with_provider, ProviderClusterReconciler, ProviderDeps, ReconcileResult};

const SNOW_MACHINE_CONFIG_KIND: &str = "SnowMachineConfig";

/// Reconciles Clusters whose datacenter is a SnowDatacenterConfig
pub struct SnowClusterReconciler {
    deps: ProviderDeps,
    provider: SnowProvider,
}

impl SnowClusterReconciler {
    /// Create a reconciler using the given collaborators
    pub fn new(deps: ProviderDeps) -> Self {
        Self {
            deps,
            provider: SnowProvider::new(),
        }
    }

    /// Every SnowMachineConfig the cluster references, keyed by name
    async fn machine_configs(
        &self,
        cluster: &Cluster,
    ) -> Result<BTreeMap<String, SnowMachineConfigSpec>> {
        let namespace = cluster.namespace().unwrap_or_default();
        let refs = cluster
            .spec
            .control_plane_configuration
            .machine_group_ref
            .iter()
            .chain(
                cluster
                    .spec
                    .worker_node_group_configurations
                    .iter()
                    .filter_map(|group| group.machine_group_ref.as_ref()),
            );

        let mut configs = BTreeMap::new();
        for machine_ref in refs {
            if configs.contains_key(&machine_ref.name) {
                continue;
            }
            check_kind(cluster, machine_ref)?;

            let config: SnowMachineConfig =
                get_resource(self.deps.kube.as_ref(), &namespace, &machine_ref.name)
                    .await?
                    .ok_or_else(|| {
                        Error::not_found(SNOW_MACHINE_CONFIG_KIND, &namespace, &machine_ref.name)
                    })?;
            debug!(machine_config = %machine_ref.name, "loaded machine config");
            configs.insert(machine_ref.name.clone(), config.spec);
        }

        Ok(configs)
    }
}

fn check_kind(cluster: &Cluster, machine_ref: &Ref) -> Result<()> {
    if machine_ref.kind == SNOW_MACHINE_CONFIG_KIND {
        return Ok(());
    }
    Err(Error::validation_for_field(
        cluster.name_any(),
        "machineGroupRef.kind",
        format!(
            "machine group {} has kind {}, expected {SNOW_MACHINE_CONFIG_KIND}",
            machine_ref.name, machine_ref.kind
        ),
    ))
}

#[async_trait]
impl ProviderClusterReconciler for SnowClusterReconciler {
    fn name(&self) -> &'static str {
        "snow"
    }

    #[instrument(skip(self, cluster), fields(provider = "snow"))]
    async fn reconcile(&self, cluster: &Cluster) -> Result<ReconcileResult> {
        let machine_configs = self.machine_configs(cluster).await?;
        reconcile_with_provider(&self.deps, &self.provider, cluster, machine_configs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockKubeClient;
    use crate::provider::test_support::*;
    use crate::provider::WORKLOAD_CLUSTER_REQUEUE;

    fn applying_capi() -> MockCAPIClient {
        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec().returning(|_, _, _, _| Ok(None));
        capi
    }

    #[tokio::test]
    async fn applies_full_object_graph_into_system_namespace() {
        let mut capi = applying_capi();
        capi.expect_apply_manifests()
            .withf(|manifests, namespace| {
                let names: Vec<(&str, &str)> = manifests
                    .iter()
                    .map(|m| (m.kind.as_str(), m.metadata.name.as_str()))
                    .collect();
                namespace == "eksa-system"
                    && names
                        == vec![
                            ("AWSSnowCluster", "snow-test"),
                            ("AWSSnowMachineTemplate", "snow-test-control-plane-1"),
                            ("KubeadmControlPlane", "snow-test"),
                            ("Cluster", "snow-test"),
                            ("KubeadmConfigTemplate", "snow-test-md-0-1"),
                            ("AWSSnowMachineTemplate", "snow-test-md-0-1"),
                            ("MachineDeployment", "snow-test-md-0"),
                        ]
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, true));
        let result = reconciler
            .reconcile(&cluster("SnowDatacenterConfig"))
            .await
            .expect("reconciles");
        assert!(result.is_done());
    }

    #[tokio::test]
    async fn worker_machine_config_is_defaulted_before_compiling() {
        let mut capi = applying_capi();
        capi.expect_apply_manifests()
            .withf(|manifests, _| {
                manifests
                    .iter()
                    .find(|m| {
                        m.kind == "AWSSnowMachineTemplate"
                            && m.metadata.name == "snow-test-md-0-1"
                    })
                    .and_then(|m| m.spec.as_ref())
                    .is_some_and(|spec| spec["template"]["spec"]["instanceType"] == "sbe-c.large")
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, true));
        reconciler
            .reconcile(&cluster("SnowDatacenterConfig"))
            .await
            .expect("reconciles");
    }

    #[tokio::test]
    async fn unreachable_workload_cluster_requeues() {
        let mut capi = applying_capi();
        capi.expect_apply_manifests().returning(|_, _| Ok(()));

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, false));
        let result = reconciler
            .reconcile(&cluster("SnowDatacenterConfig"))
            .await
            .expect("reconciles");
        assert_eq!(result, ReconcileResult::requeue_after(WORKLOAD_CLUSTER_REQUEUE));
    }

    #[tokio::test]
    async fn missing_machine_config_is_retryable_not_found() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_object().returning(|resource, _, name| {
            if resource.kind == "Bundles" {
                Ok(Some(bundles_object()))
            } else if name == "test-cp" {
                Ok(Some(machine_config_object("test-cp", "sbe-c.large")))
            } else {
                Ok(None)
            }
        });
        let mut capi = MockCAPIClient::new();
        capi.expect_apply_manifests().never();

        let reconciler = SnowClusterReconciler::new(deps(kube, capi, true));
        let err = reconciler
            .reconcile(&cluster("SnowDatacenterConfig"))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "SnowMachineConfig test-namespace/test-wn not found"
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn machine_group_of_wrong_kind_is_rejected() {
        let mut cluster = cluster("SnowDatacenterConfig");
        cluster.spec.worker_node_group_configurations[0].machine_group_ref =
            Some(Ref::new("VSphereMachineConfig", "test-wn"));
        let mut capi = MockCAPIClient::new();
        capi.expect_apply_manifests().never();

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, true));
        let err = reconciler.reconcile(&cluster).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(err.to_string().contains("VSphereMachineConfig"));
    }

    #[tokio::test]
    async fn invalid_spec_applies_nothing() {
        let mut cluster = cluster("SnowDatacenterConfig");
        cluster.spec.control_plane_configuration.endpoint.host.clear();
        let mut capi = MockCAPIClient::new();
        capi.expect_apply_manifests().never();

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, true));
        let err = reconciler.reconcile(&cluster).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn apply_conflict_propagates_unchanged() {
        let mut capi = applying_capi();
        capi.expect_apply_manifests().returning(|_, _| {
            Err(Error::from(kube::Error::Api(kube::error::ErrorResponse {
                status: "Failure".to_string(),
                message: "the object has been modified".to_string(),
                reason: "Conflict".to_string(),
                code: 409,
            })))
        });

        let reconciler = SnowClusterReconciler::new(deps(populated_kube(), capi, true));
        let err = reconciler
            .reconcile(&cluster("SnowDatacenterConfig"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.is_retryable());
    }
}
