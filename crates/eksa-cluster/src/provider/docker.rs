//! Docker cluster reconciliation

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::instrument;

use eksa_capi::DockerProvider;
use eksa_common::crd::Cluster;
use eksa_common::Result;

use super::{reconcile_with_provider, ProviderClusterReconciler, ProviderDeps, ReconcileResult};

/// Reconciles Clusters whose datacenter is a DockerDatacenterConfig
///
/// Docker machines come from the kind node image in the versions bundle, so
/// no machine configs are resolved.
pub struct DockerClusterReconciler {
    deps: ProviderDeps,
    provider: DockerProvider,
}

impl DockerClusterReconciler {
    /// Create a reconciler using the given collaborators
    pub fn new(deps: ProviderDeps) -> Self {
        Self {
            deps,
            provider: DockerProvider::new(),
        }
    }
}

#[async_trait]
impl ProviderClusterReconciler for DockerClusterReconciler {
    fn name(&self) -> &'static str {
        "docker"
    }

    #[instrument(skip(self, cluster), fields(provider = "docker"))]
    async fn reconcile(&self, cluster: &Cluster) -> Result<ReconcileResult> {
        reconcile_with_provider(&self.deps, &self.provider, cluster, BTreeMap::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::*;

    #[tokio::test]
    async fn applies_docker_object_graph() {
        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec().returning(|_, _, _, _| Ok(None));
        capi.expect_apply_manifests()
            .withf(|manifests, namespace| {
                namespace == "eksa-system"
                    && manifests.len() == 7
                    && manifests[0].kind == "DockerCluster"
                    && manifests[1].kind == "DockerMachineTemplate"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let reconciler = DockerClusterReconciler::new(deps(populated_kube(), capi, true));
        let result = reconciler
            .reconcile(&cluster("DockerDatacenterConfig"))
            .await
            .expect("reconciles");
        assert!(result.is_done());
    }

    #[tokio::test]
    async fn machine_configs_are_never_read() {
        let mut kube = crate::client::MockKubeClient::new();
        kube.expect_get_object()
            .withf(|resource, _, _| resource.kind == "Bundles")
            .times(1)
            .returning(|_, _, _| Ok(Some(bundles_object())));
        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec().returning(|_, _, _, _| Ok(None));
        capi.expect_apply_manifests().returning(|_, _| Ok(()));

        let reconciler = DockerClusterReconciler::new(deps(kube, capi, true));
        reconciler
            .reconcile(&cluster("DockerDatacenterConfig"))
            .await
            .expect("reconciles");
    }
}
