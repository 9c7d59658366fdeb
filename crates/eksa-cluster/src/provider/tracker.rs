//! Workload cluster reachability through the CAPI kubeconfig secret

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use tracing::debug;

use crate::client::KubeClient;
use eksa_common::crd::Cluster;
use eksa_common::{Error, Result, EKSA_SYSTEM_NAMESPACE};

use super::RemoteClusterTracker;

/// Key of the kubeconfig inside the CAPI secret
const KUBECONFIG_KEY: &str = "value";

/// Upper bound for one reachability check
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Name of the secret CAPI writes once the control plane is initialized
pub fn kubeconfig_secret_name(cluster_name: &str) -> String {
    format!("{cluster_name}-kubeconfig")
}

/// Tracks workload clusters through the kubeconfig secret CAPI publishes
///
/// A cluster without a kubeconfig secret is not reachable yet. Once the
/// secret exists the API server is asked for its version.
pub struct KubeconfigSecretTracker {
    kube: Arc<dyn KubeClient>,
}

impl KubeconfigSecretTracker {
    /// Create a tracker reading secrets through `kube`
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }
}

#[async_trait]
impl RemoteClusterTracker for KubeconfigSecretTracker {
    async fn is_reachable(&self, cluster: &Cluster) -> Result<bool> {
        let secret_name = kubeconfig_secret_name(&cluster.name_any());
        let Some(secret) = self
            .kube
            .get_secret(EKSA_SYSTEM_NAMESPACE, &secret_name)
            .await?
        else {
            debug!(secret = %secret_name, "kubeconfig secret not published yet");
            return Ok(false);
        };

        let kubeconfig = parse_kubeconfig(&secret)?;
        Ok(api_server_reachable(kubeconfig).await)
    }
}

fn parse_kubeconfig(secret: &Secret) -> Result<Kubeconfig> {
    let name = secret.name_any();
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_KEY))
        .ok_or_else(|| {
            Error::internal_with_context(
                "tracker",
                format!("secret {name} has no {KUBECONFIG_KEY} key"),
            )
        })?;

    let text = std::str::from_utf8(&bytes.0).map_err(|e| {
        Error::internal_with_context("tracker", format!("secret {name} is not UTF-8: {e}"))
    })?;

    Kubeconfig::from_yaml(text).map_err(|e| {
        Error::internal_with_context(
            "tracker",
            format!("secret {name} holds an invalid kubeconfig: {e}"),
        )
    })
}

/// True when the API server answers a version request in time
async fn api_server_reachable(kubeconfig: Kubeconfig) -> bool {
    let options = KubeConfigOptions::default();
    let config = match Config::from_custom_kubeconfig(kubeconfig, &options).await {
        Ok(config) => config,
        Err(e) => {
            debug!(error = %e, "failed to build workload cluster config");
            return false;
        }
    };

    let client = match Client::try_from(config) {
        Ok(client) => client,
        Err(e) => {
            debug!(error = %e, "failed to create workload cluster client");
            return false;
        }
    };

    match tokio::time::timeout(PROBE_TIMEOUT, client.apiserver_version()).await {
        Ok(Ok(version)) => {
            debug!(version = %version.git_version, "workload API server reachable");
            true
        }
        Ok(Err(e)) => {
            debug!(error = %e, "workload API server request failed");
            false
        }
        Err(_) => {
            debug!("timed out waiting for workload API server");
            false
        }
    }
}
