//! Infrastructure provider abstraction layer
//!
//! Each infrastructure provider implements [`Provider`] to compile a resolved
//! [`ClusterSpec`] into the Cluster API objects that describe it. Compilation
//! is pure: the same spec and template generations always produce the same
//! manifests, and nothing here talks to the API server.
//!
//! The builders in this module are shared by every provider. Providers
//! contribute their infrastructure kinds, machine templates and node
//! bootstrap commands.

pub mod docker;
pub mod proxy;
pub mod registry_mirror;
pub mod snow;

pub use docker::DockerProvider;
pub use snow::SnowProvider;

use std::collections::BTreeMap;

use eksa_common::crd::WorkerNodeGroupConfiguration;
use eksa_common::{
    ClusterSpec, Error, Result, CAPI_CLUSTER_NAME_LABEL, CLUSTER_NAME_LABEL,
    CLUSTER_NAMESPACE_LABEL, EKSA_SYSTEM_NAMESPACE,
};

/// A CAPI manifest represented as an untyped Kubernetes resource
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CAPIManifest {
    /// API version (e.g., "cluster.x-k8s.io/v1beta1")
    pub api_version: String,
    /// Kind of resource (e.g., "Cluster", "MachineDeployment")
    pub kind: String,
    /// Resource metadata
    pub metadata: ManifestMetadata,
    /// Resource spec (untyped)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl CAPIManifest {
    /// Create a new CAPI manifest
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            metadata: ManifestMetadata {
                name: name.into(),
                namespace: Some(namespace.into()),
                labels: None,
                annotations: None,
            },
            spec: None,
        }
    }

    /// Set the spec for this manifest
    pub fn with_spec(mut self, spec: serde_json::Value) -> Self {
        self.spec = Some(spec);
        self
    }

    /// Add labels to the manifest
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.metadata.labels = Some(labels);
        self
    }

    /// Reference to this manifest for use in a sibling object's spec
    pub fn object_ref(&self) -> serde_json::Value {
        serde_json::json!({
            "apiVersion": self.api_version,
            "kind": self.kind,
            "name": self.metadata.name,
        })
    }

    /// Serialize the manifest to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::serialization(e.to_string()))
    }
}

/// Metadata for a CAPI manifest
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ManifestMetadata {
    /// Name of the resource
    pub name: String,
    /// Namespace (optional for cluster-scoped resources)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// CAPI Cluster API version
pub const CAPI_CLUSTER_API_VERSION: &str = "cluster.x-k8s.io/v1beta1";
/// CAPI Bootstrap API version for KubeadmConfigTemplate
pub const CAPI_BOOTSTRAP_API_VERSION: &str = "bootstrap.cluster.x-k8s.io/v1beta1";
/// CAPI Control Plane API version for KubeadmControlPlane
pub const CAPI_CONTROLPLANE_API_VERSION: &str = "controlplane.cluster.x-k8s.io/v1beta1";
/// API version shared by infrastructure provider kinds
pub const CAPI_INFRASTRUCTURE_API_VERSION: &str = "infrastructure.cluster.x-k8s.io/v1beta1";

/// Only cipher suite control plane components and kubelets accept
pub const TLS_CIPHER_SUITES: &str = "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256";

/// Compiles a resolved cluster spec into Cluster API objects
pub trait Provider: Send + Sync {
    /// Short provider name used in logs and errors (e.g., "snow")
    fn name(&self) -> &'static str;

    /// Compile the cluster spec into its CAPI object graph
    fn compile(
        &self,
        spec: &ClusterSpec,
        generations: &TemplateGenerations,
    ) -> Result<CompiledCluster>;
}

/// The object graph produced for one cluster
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledCluster {
    /// CAPI Cluster
    pub cluster: CAPIManifest,
    /// Provider infrastructure cluster (e.g., AWSSnowCluster)
    pub infrastructure_cluster: CAPIManifest,
    /// Machine template for control plane machines
    pub control_plane_template: CAPIManifest,
    /// KubeadmControlPlane
    pub control_plane: CAPIManifest,
    /// One entry per worker node group, in declaration order
    pub workers: Vec<CompiledWorkerGroup>,
}

/// Objects generated for one worker node group
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledWorkerGroup {
    /// Worker node group name
    pub name: String,
    /// KubeadmConfigTemplate
    pub kubeadm_config_template: CAPIManifest,
    /// Provider machine template
    pub machine_template: CAPIManifest,
    /// MachineDeployment
    pub machine_deployment: CAPIManifest,
}

impl CompiledCluster {
    /// All manifests, templates before the objects that reference them
    pub fn manifests(&self) -> Vec<CAPIManifest> {
        let mut manifests = vec![
            self.infrastructure_cluster.clone(),
            self.control_plane_template.clone(),
            self.control_plane.clone(),
            self.cluster.clone(),
        ];
        for worker in &self.workers {
            manifests.push(worker.kubeadm_config_template.clone());
            manifests.push(worker.machine_template.clone());
            manifests.push(worker.machine_deployment.clone());
        }
        manifests
    }

    /// The worker group with the given name
    pub fn worker(&self, name: &str) -> Option<&CompiledWorkerGroup> {
        self.workers.iter().find(|w| w.name == name)
    }
}

// ============================================================================
// Template naming
// ============================================================================

/// Generation counters for immutable templates
///
/// Machine templates and KubeadmConfigTemplates are immutable once machines
/// use them. A changed template gets a new name with the next generation
/// number; an unchanged one keeps its current name. Every counter starts at 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateGenerations {
    control_plane: u64,
    workers: BTreeMap<String, WorkerGenerations>,
}

/// Generation counters for one worker group
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerGenerations {
    /// Machine template generation
    pub machine_template: u64,
    /// KubeadmConfigTemplate generation
    pub kubeadm_config: u64,
}

impl Default for WorkerGenerations {
    fn default() -> Self {
        Self {
            machine_template: 1,
            kubeadm_config: 1,
        }
    }
}

impl Default for TemplateGenerations {
    fn default() -> Self {
        Self {
            control_plane: 1,
            workers: BTreeMap::new(),
        }
    }
}

impl TemplateGenerations {
    /// Set the control plane machine template generation
    pub fn with_control_plane(mut self, generation: u64) -> Self {
        self.control_plane = generation;
        self
    }

    /// Set the generations for a worker group
    pub fn with_worker(mut self, group: impl Into<String>, generations: WorkerGenerations) -> Self {
        self.workers.insert(group.into(), generations);
        self
    }

    /// Control plane machine template generation
    pub fn control_plane(&self) -> u64 {
        self.control_plane
    }

    /// Generations for a worker group
    pub fn worker(&self, group: &str) -> WorkerGenerations {
        self.workers.get(group).copied().unwrap_or_default()
    }
}

/// Name of the control plane machine template, e.g. "snow-test-control-plane-1"
pub fn control_plane_template_name(cluster: &str, generation: u64) -> String {
    format!("{cluster}-control-plane-{generation}")
}

/// Name of a worker group template, e.g. "snow-test-md-0-1"
pub fn worker_template_name(cluster: &str, group: &str, generation: u64) -> String {
    format!("{cluster}-{group}-{generation}")
}

/// Name of a worker group's MachineDeployment, e.g. "snow-test-md-0"
pub fn machine_deployment_name(cluster: &str, group: &str) -> String {
    format!("{cluster}-{group}")
}

/// Generation number at the end of a template name
pub fn parse_template_generation(name: &str) -> Option<u64> {
    name.rsplit_once('-')
        .and_then(|(_, generation)| generation.parse().ok())
}

// ============================================================================
// Shared builders
// ============================================================================

/// Labels carried by every generated object
pub fn create_cluster_labels(spec: &ClusterSpec) -> BTreeMap<String, String> {
    let name = spec.name();
    BTreeMap::from([
        (CAPI_CLUSTER_NAME_LABEL.to_string(), name.clone()),
        (CLUSTER_NAME_LABEL.to_string(), name),
        (CLUSTER_NAMESPACE_LABEL.to_string(), spec.namespace()),
    ])
}

/// Start a manifest in the system namespace with the standard labels
pub fn labeled_manifest(
    spec: &ClusterSpec,
    api_version: &str,
    kind: &str,
    name: impl Into<String>,
) -> CAPIManifest {
    CAPIManifest::new(api_version, kind, name, EKSA_SYSTEM_NAMESPACE)
        .with_labels(create_cluster_labels(spec))
}

/// Provider-specific node bootstrap settings
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeBootstrap {
    /// kubelet extra args
    pub kubelet_extra_args: BTreeMap<String, String>,
    /// Commands run before kubeadm
    pub pre_kubeadm_commands: Vec<String>,
    /// Commands run after kubeadm
    pub post_kubeadm_commands: Vec<String>,
}

/// Files and pre-kubeadm commands for a node, with cluster-wide additions
///
/// Registry mirror additions come first, then proxy additions. Commands are
/// appended to the provider's base list without deduplication.
fn bootstrap_files_and_commands(
    spec: &ClusterSpec,
    bootstrap: &NodeBootstrap,
) -> (Vec<serde_json::Value>, Vec<String>) {
    let mut files = Vec::new();
    let mut commands = bootstrap.pre_kubeadm_commands.clone();

    if let Some(mirror) = &spec.spec().registry_mirror_configuration {
        files.extend(registry_mirror::generate_mirror_files(mirror));
        commands.extend(registry_mirror::mirror_commands());
    }

    if let Some(proxy_file) = proxy::generate_proxy_file(spec) {
        files.push(proxy_file);
        commands.extend(proxy::proxy_commands());
    }

    (files, commands)
}

/// Generate the CAPI Cluster
///
/// References the control plane and infrastructure cluster by the identity of
/// the sibling manifests.
pub fn generate_cluster(
    spec: &ClusterSpec,
    infrastructure_cluster: &CAPIManifest,
    control_plane: &CAPIManifest,
) -> CAPIManifest {
    let network = &spec.spec().cluster_network;
    labeled_manifest(spec, CAPI_CLUSTER_API_VERSION, "Cluster", spec.name()).with_spec(
        serde_json::json!({
            "clusterNetwork": {
                "pods": { "cidrBlocks": network.pods.cidr_blocks },
                "services": { "cidrBlocks": network.services.cidr_blocks }
            },
            "controlPlaneRef": control_plane.object_ref(),
            "infrastructureRef": infrastructure_cluster.object_ref()
        }),
    )
}

/// Generate the KubeadmControlPlane
pub fn generate_kubeadm_control_plane(
    spec: &ClusterSpec,
    machine_template: &CAPIManifest,
    bootstrap: &NodeBootstrap,
) -> CAPIManifest {
    let bundle = spec.versions_bundle();
    let distro = &bundle.kube_distro;
    let (files, pre_kubeadm_commands) = bootstrap_files_and_commands(spec, bootstrap);

    let mut kubelet_extra_args = bootstrap.kubelet_extra_args.clone();
    kubelet_extra_args.insert("tls-cipher-suites".to_string(), TLS_CIPHER_SUITES.to_string());

    let kubeadm_config_spec = serde_json::json!({
        "clusterConfiguration": {
            "imageRepository": distro.kubernetes.repository,
            "dns": {
                "imageRepository": distro.core_dns.repository,
                "imageTag": distro.core_dns.tag
            },
            "etcd": {
                "local": {
                    "imageRepository": distro.etcd.repository,
                    "imageTag": distro.etcd.tag,
                    "extraArgs": {
                        "listen-peer-urls": "https://0.0.0.0:2380",
                        "listen-client-urls": "https://0.0.0.0:2379"
                    }
                }
            },
            "apiServer": {
                "extraArgs": {},
                "extraVolumes": []
            },
            "controllerManager": {
                "extraArgs": {
                    "tls-cipher-suites": TLS_CIPHER_SUITES
                }
            }
        },
        "initConfiguration": {
            "nodeRegistration": { "kubeletExtraArgs": kubelet_extra_args }
        },
        "joinConfiguration": {
            "nodeRegistration": { "kubeletExtraArgs": kubelet_extra_args }
        },
        "preKubeadmCommands": pre_kubeadm_commands,
        "postKubeadmCommands": bootstrap.post_kubeadm_commands,
        "files": files
    });

    labeled_manifest(
        spec,
        CAPI_CONTROLPLANE_API_VERSION,
        "KubeadmControlPlane",
        spec.name(),
    )
    .with_spec(serde_json::json!({
        "machineTemplate": {
            "infrastructureRef": machine_template.object_ref()
        },
        "kubeadmConfigSpec": kubeadm_config_spec,
        "replicas": spec.spec().control_plane_configuration.count,
        "version": spec.kubernetes_version()
    }))
}

/// Generate a KubeadmConfigTemplate for a worker group
pub fn generate_kubeadm_config_template(
    spec: &ClusterSpec,
    name: impl Into<String>,
    bootstrap: &NodeBootstrap,
) -> CAPIManifest {
    let (files, pre_kubeadm_commands) = bootstrap_files_and_commands(spec, bootstrap);

    labeled_manifest(spec, CAPI_BOOTSTRAP_API_VERSION, "KubeadmConfigTemplate", name).with_spec(
        serde_json::json!({
            "template": {
                "spec": {
                    "clusterConfiguration": {
                        "controllerManager": { "extraArgs": {} },
                        "apiServer": { "extraArgs": {} }
                    },
                    "joinConfiguration": {
                        "nodeRegistration": {
                            "kubeletExtraArgs": bootstrap.kubelet_extra_args
                        }
                    },
                    "preKubeadmCommands": pre_kubeadm_commands,
                    "postKubeadmCommands": bootstrap.post_kubeadm_commands,
                    "files": files
                }
            }
        }),
    )
}

/// Generate the MachineDeployment for a worker group
pub fn generate_machine_deployment(
    spec: &ClusterSpec,
    group: &WorkerNodeGroupConfiguration,
    kubeadm_config_template: &CAPIManifest,
    machine_template: &CAPIManifest,
) -> CAPIManifest {
    let cluster_name = spec.name();
    labeled_manifest(
        spec,
        CAPI_CLUSTER_API_VERSION,
        "MachineDeployment",
        machine_deployment_name(&cluster_name, &group.name),
    )
    .with_spec(serde_json::json!({
        "clusterName": cluster_name,
        "replicas": group.count,
        "selector": { "matchLabels": {} },
        "template": {
            "metadata": {
                "labels": { CAPI_CLUSTER_NAME_LABEL: cluster_name }
            },
            "spec": {
                "clusterName": cluster_name,
                "bootstrap": {
                    "configRef": kubeadm_config_template.object_ref()
                },
                "infrastructureRef": machine_template.object_ref(),
                "version": spec.kubernetes_version()
            }
        }
    }))
}
