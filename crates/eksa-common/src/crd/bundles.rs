//! Bundles CRD: the image versions a cluster is built from
//!
//! One Bundles object lists a versions bundle per supported Kubernetes
//! minor version. A Cluster points at its Bundles with `spec.bundlesRef`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Image;

/// Specification for Bundles
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "anywhere.eks.amazonaws.com",
    version = "v1alpha1",
    kind = "Bundles",
    plural = "bundles",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct BundlesSpec {
    /// Monotonic bundle release number
    #[serde(default)]
    pub number: u32,
    /// One entry per supported Kubernetes minor version
    #[serde(default)]
    pub versions_bundles: Vec<VersionsBundle>,
}

impl Bundles {
    /// Versions bundle for a Kubernetes minor version (e.g., "1.21")
    pub fn versions_bundle(&self, kube_version: &str) -> Option<&VersionsBundle> {
        self.spec
            .versions_bundles
            .iter()
            .find(|b| b.kube_version == kube_version)
    }
}

/// Images for a single Kubernetes minor version
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VersionsBundle {
    /// Kubernetes minor version this bundle serves (e.g., "1.21")
    pub kube_version: String,
    /// EKS Distro release
    pub eks_d: EksDRelease,
    /// Kubernetes distribution images
    pub kube_distro: KubeDistro,
    /// kube-vip image used by Snow control plane bootstrap
    pub kube_vip: Image,
    /// Docker provider images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerBundle>,
}

/// EKS Distro release information
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EksDRelease {
    /// Upstream Kubernetes patch version (e.g., "v1.21.5")
    pub kube_version: String,
    /// Distribution suffix (e.g., "eks-1-21-9")
    pub distro_suffix: String,
}

impl EksDRelease {
    /// Full distribution version, e.g. "v1.21.5-eks-1-21-9"
    pub fn version(&self) -> String {
        format!("{}-{}", self.kube_version, self.distro_suffix)
    }
}

/// Kubernetes distribution images
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeDistro {
    /// Core Kubernetes component images (apiserver, controller-manager, ...)
    pub kubernetes: Image,
    /// CoreDNS image
    pub core_dns: Image,
    /// etcd image
    pub etcd: Image,
}

/// Images used only by the Docker provider
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DockerBundle {
    /// kind node image for machines
    pub kind_node: Image,
    /// HAProxy image for the control plane load balancer
    pub haproxy: Image,
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn bundles() -> Bundles {
        Bundles {
            metadata: ObjectMeta {
                name: Some("bundles-1".to_string()),
                namespace: Some("eksa-system".to_string()),
                ..Default::default()
            },
            spec: BundlesSpec {
                number: 1,
                versions_bundles: vec![
                    VersionsBundle {
                        kube_version: "1.20".to_string(),
                        ..Default::default()
                    },
                    VersionsBundle {
                        kube_version: "1.21".to_string(),
                        eks_d: EksDRelease {
                            kube_version: "v1.21.5".to_string(),
                            distro_suffix: "eks-1-21-9".to_string(),
                        },
                        ..Default::default()
                    },
                ],
            },
        }
    }

    #[test]
    fn selects_bundle_by_minor_version() {
        let bundles = bundles();
        let bundle = bundles.versions_bundle("1.21").expect("1.21 bundle");
        assert_eq!(bundle.eks_d.version(), "v1.21.5-eks-1-21-9");
        assert!(bundles.versions_bundle("1.30").is_none());
    }
}
