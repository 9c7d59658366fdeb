//! Provider reconcilers
//!
//! A provider reconciler turns a Cluster into applied Cluster API objects for
//! one infrastructure. The controller never names a provider; it asks the
//! [`ProviderRegistry`] for the reconciler serving the Cluster's datacenter
//! kind and calls [`ProviderClusterReconciler::reconcile`].
//!
//! Every reconciler follows the same pipeline:
//!
//! 1. Resolve the versions bundle through `spec.bundlesRef`
//! 2. Resolve provider-specific machine configs
//! 3. Default, then validate, the resulting [`ClusterSpec`]
//! 4. Pick template generations so immutable templates rotate on change
//! 5. Compile and server-side apply the manifests into `eksa-system`
//! 6. Requeue until the workload cluster's API server answers

mod defaulter;
mod docker;
mod registry;
mod snow;
mod templates;
mod tracker;
mod validator;

pub use defaulter::SpecDefaulter;
pub use docker::DockerClusterReconciler;
pub use registry::{ProviderConstructor, ProviderRegistry};
pub use snow::SnowClusterReconciler;
pub use templates::{json_contains, resolve_generations};
pub use tracker::{kubeconfig_secret_name, KubeconfigSecretTracker};
pub use validator::SpecValidator;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::client::{get_resource, KubeClient};
use eksa_capi::{CAPIClient, Provider};
use eksa_common::crd::{Bundles, Cluster, SnowMachineConfigSpec, VersionsBundle};
use eksa_common::{ClusterSpec, Error, Result, EKSA_SYSTEM_NAMESPACE};

/// How long to wait before checking again whether a new workload cluster is up
pub const WORKLOAD_CLUSTER_REQUEUE: Duration = Duration::from_secs(30);

/// Outcome of a reconciliation that did not fail
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Reconcile again after the controller's default interval
    pub requeue: bool,
    /// Reconcile again after this delay; takes precedence over `requeue`
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Converged; wait for the next change
    pub fn done() -> Self {
        Self::default()
    }

    /// Reconcile again after the default interval
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Reconcile again after `delay`
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: false,
            requeue_after: Some(delay),
        }
    }

    /// True when no further reconciliation was asked for
    pub fn is_done(&self) -> bool {
        !self.requeue && self.requeue_after.is_none()
    }

    /// Map to a controller action
    pub fn to_action(&self, requeue_interval: Duration) -> Action {
        match (self.requeue_after, self.requeue) {
            (Some(delay), _) => Action::requeue(delay),
            (None, true) => Action::requeue(requeue_interval),
            (None, false) => Action::await_change(),
        }
    }
}

/// Reconciles a Cluster for one infrastructure provider
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProviderClusterReconciler: Send + Sync {
    /// Short provider name used in logs (e.g., "snow")
    fn name(&self) -> &'static str;

    /// Converge the Cluster's infrastructure objects
    async fn reconcile(&self, cluster: &Cluster) -> Result<ReconcileResult>;
}

/// Rejects cluster specs that cannot be compiled into a working cluster
#[cfg_attr(test, automock)]
pub trait Validator: Send + Sync {
    /// Validate a defaulted spec
    fn validate(&self, spec: &ClusterSpec) -> Result<()>;
}

/// Fills unset optional fields of a cluster spec
#[cfg_attr(test, automock)]
pub trait Defaulter: Send + Sync {
    /// Return the spec with defaults applied
    fn apply_defaults(&self, spec: ClusterSpec) -> ClusterSpec;
}

/// Answers whether a workload cluster's API server is reachable
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClusterTracker: Send + Sync {
    /// True once the workload cluster answers API requests
    async fn is_reachable(&self, cluster: &Cluster) -> Result<bool>;
}

/// Collaborators handed to a provider reconciler when it is built
#[derive(Clone)]
pub struct ProviderDeps {
    /// Store client
    pub kube: Arc<dyn KubeClient>,
    /// Applies compiled manifests
    pub capi: Arc<dyn CAPIClient>,
    /// Spec validator
    pub validator: Arc<dyn Validator>,
    /// Spec defaulter
    pub defaulter: Arc<dyn Defaulter>,
    /// Workload cluster reachability
    pub tracker: Arc<dyn RemoteClusterTracker>,
}

/// Versions bundle for the cluster's Kubernetes version
async fn load_versions_bundle(kube: &dyn KubeClient, cluster: &Cluster) -> Result<VersionsBundle> {
    let name = cluster.name_any();
    let bundles_ref = cluster.spec.bundles_ref.as_ref().ok_or_else(|| {
        Error::validation_for_field(&name, "spec.bundlesRef", "bundlesRef is required")
    })?;

    let bundles: Bundles = get_resource(kube, &bundles_ref.namespace, &bundles_ref.name)
        .await?
        .ok_or_else(|| Error::not_found("Bundles", &bundles_ref.namespace, &bundles_ref.name))?;

    let kubernetes_version = &cluster.spec.kubernetes_version;
    bundles
        .versions_bundle(kubernetes_version)
        .cloned()
        .ok_or_else(|| {
            Error::validation_for_field(
                &name,
                "spec.kubernetesVersion",
                format!(
                    "bundles {} has no versions bundle for kubernetes version {kubernetes_version}",
                    bundles_ref.name
                ),
            )
        })
}

/// Shared pipeline from a resolved Cluster to applied manifests
async fn reconcile_with_provider(
    deps: &ProviderDeps,
    provider: &dyn Provider,
    cluster: &Cluster,
    machine_configs: BTreeMap<String, SnowMachineConfigSpec>,
) -> Result<ReconcileResult> {
    let versions_bundle = load_versions_bundle(deps.kube.as_ref(), cluster).await?;
    let spec =
        ClusterSpec::new(cluster.clone(), versions_bundle).with_machine_configs(machine_configs);
    let spec = deps.defaulter.apply_defaults(spec);
    deps.validator.validate(&spec)?;

    let generations = resolve_generations(deps.capi.as_ref(), provider, &spec).await?;
    let compiled = provider.compile(&spec, &generations)?;
    let manifests = compiled.manifests();
    deps.capi
        .apply_manifests(&manifests, EKSA_SYSTEM_NAMESPACE)
        .await?;

    info!(
        provider = provider.name(),
        manifests = manifests.len(),
        control_plane_generation = generations.control_plane(),
        "applied cluster manifests"
    );

    if !deps.tracker.is_reachable(cluster).await? {
        info!("workload cluster not reachable yet");
        return Ok(ReconcileResult::requeue_after(WORKLOAD_CLUSTER_REQUEUE));
    }

    Ok(ReconcileResult::done())
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    mod reconcile_result {
        use super::*;

        #[test]
        fn requeue_after_wins_over_requeue() {
            let result = ReconcileResult {
                requeue: true,
                requeue_after: Some(Duration::from_secs(30)),
            };
            assert_eq!(
                result.to_action(Duration::from_secs(300)),
                Action::requeue(Duration::from_secs(30))
            );
        }

        #[test]
        fn requeue_uses_default_interval() {
            assert_eq!(
                ReconcileResult::requeue().to_action(Duration::from_secs(300)),
                Action::requeue(Duration::from_secs(300))
            );
        }

        #[test]
        fn done_waits_for_change() {
            assert!(ReconcileResult::done().is_done());
            assert_eq!(
                ReconcileResult::done().to_action(Duration::from_secs(300)),
                Action::await_change()
            );
        }
    }

    mod bundles {
        use super::*;

        #[tokio::test]
        async fn selects_versions_bundle_for_cluster_version() {
            let kube = populated_kube();
            let bundle = load_versions_bundle(&kube, &cluster("SnowDatacenterConfig"))
                .await
                .expect("bundle resolves");
            assert_eq!(bundle.eks_d.version(), "v1.21.5-eks-1-21-9");
        }

        #[tokio::test]
        async fn missing_bundles_ref_is_a_validation_error() {
            let kube = crate::client::MockKubeClient::new();
            let mut cluster = cluster("SnowDatacenterConfig");
            cluster.spec.bundles_ref = None;

            let err = load_versions_bundle(&kube, &cluster).await.unwrap_err();
            assert!(matches!(err, Error::Validation { .. }));
            assert!(!err.is_retryable());
        }

        #[tokio::test]
        async fn missing_bundles_object_is_retryable() {
            let mut kube = crate::client::MockKubeClient::new();
            kube.expect_get_object().returning(|_, _, _| Ok(None));

            let err = load_versions_bundle(&kube, &cluster("SnowDatacenterConfig"))
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Bundles eksa-system/bundles-1 not found");
            assert!(err.is_retryable());
        }

        #[tokio::test]
        async fn unknown_kubernetes_version_names_the_version() {
            let kube = populated_kube();
            let mut cluster = cluster("SnowDatacenterConfig");
            cluster.spec.kubernetes_version = "1.30".to_string();

            let err = load_versions_bundle(&kube, &cluster).await.unwrap_err();
            assert!(err.to_string().contains("1.30"));
            assert!(!err.is_retryable());
        }
    }
}
