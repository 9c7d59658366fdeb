//! Cluster Custom Resource Definition
//!
//! The Cluster CRD is the user-declared, provider-agnostic description of a
//! Kubernetes cluster. The datacenter reference selects which infrastructure
//! provider reconciles it.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Ref;

/// Specification for a Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "anywhere.eks.amazonaws.com",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    status = "ClusterStatus",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Datacenter","type":"string","jsonPath":".spec.datacenterRef.kind"}"#,
    printcolumn = r#"{"name":"K8s","type":"string","jsonPath":".spec.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"Failure","type":"string","jsonPath":".status.failureMessage"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResourceSpec {
    /// Kubernetes minor version (e.g., "1.21")
    pub kubernetes_version: String,

    /// Control plane topology
    pub control_plane_configuration: ControlPlaneConfiguration,

    /// Worker node groups
    #[serde(default)]
    pub worker_node_group_configurations: Vec<WorkerNodeGroupConfiguration>,

    /// Datacenter configuration; `kind` selects the infrastructure provider
    pub datacenter_ref: Ref,

    /// Pod and service networks
    pub cluster_network: ClusterNetwork,

    /// Local registry mirror for container images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_mirror_configuration: Option<RegistryMirrorConfiguration>,

    /// HTTP proxy used by containerd on every node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_configuration: Option<ProxyConfiguration>,

    /// Identity provider objects (OIDCConfig, AWSIamConfig) owned by this cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identity_provider_refs: Vec<Ref>,

    /// Cluster that manages this one
    #[serde(default)]
    pub management_cluster: ManagementCluster,

    /// Bundles object holding image versions for this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundles_ref: Option<BundlesRef>,
}

/// Control plane configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfiguration {
    /// Number of control plane machines
    pub count: u32,
    /// API server endpoint
    pub endpoint: Endpoint,
    /// Machine config used for control plane machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

/// Control plane endpoint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Endpoint {
    /// Host (IP or DNS name) of the API server endpoint
    pub host: String,
}

/// One worker node group
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNodeGroupConfiguration {
    /// Group name, used in generated object names
    pub name: String,
    /// Number of machines
    pub count: u32,
    /// Machine config used for machines in this group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

/// Cluster networks
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterNetwork {
    /// Pod network
    pub pods: CidrBlocks,
    /// Service network
    pub services: CidrBlocks,
}

/// A list of CIDR blocks
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CidrBlocks {
    /// CIDR blocks (e.g., "10.1.0.0/16")
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

/// Registry mirror configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryMirrorConfiguration {
    /// Mirror host
    pub endpoint: String,
    /// Mirror port; defaulted to 443 when empty
    #[serde(default)]
    pub port: String,
    /// PEM-encoded CA certificate for the mirror
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_content: Option<String>,
    /// Skip TLS verification of the mirror
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

/// Proxy configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfiguration {
    /// HTTP proxy URL
    pub http_proxy: String,
    /// HTTPS proxy URL
    pub https_proxy: String,
    /// Additional destinations that bypass the proxy
    #[serde(default)]
    pub no_proxy: Vec<String>,
}

/// The cluster that manages this one
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ManagementCluster {
    /// Name of the management cluster; empty means unset
    #[serde(default)]
    pub name: String,
}

/// Reference to a Bundles object
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BundlesRef {
    /// Name of the Bundles object
    pub name: String,
    /// Namespace of the Bundles object
    pub namespace: String,
}

/// Status for a Cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Message describing a configuration error the user must fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl Cluster {
    /// Name of the cluster managing this one
    pub fn managed_by(&self) -> &str {
        &self.spec.management_cluster.name
    }

    /// Record which cluster manages this one
    pub fn set_managed_by(&mut self, management_cluster: impl Into<String>) {
        self.spec.management_cluster.name = management_cluster.into();
    }

    /// A cluster with no management cluster, or managed by itself, is self-managed
    pub fn is_self_managed(&self) -> bool {
        let managed_by = self.managed_by();
        managed_by.is_empty() || managed_by == self.name_any()
    }

    /// Current failure message, if any
    pub fn failure_message(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.failure_message.as_deref())
    }

    /// Owner reference pointing at this cluster
    ///
    /// Attached to objects whose lifetime follows the cluster's.
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: Cluster::api_version(&()).to_string(),
            kind: Cluster::kind(&()).to_string(),
            name: self.name_any(),
            uid: self.metadata.uid.clone().unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn sample_cluster() -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some("snow-test".to_string()),
                namespace: Some("test-namespace".to_string()),
                uid: Some("uid-1234".to_string()),
                ..Default::default()
            },
            spec: ClusterResourceSpec {
                kubernetes_version: "1.21".to_string(),
                datacenter_ref: Ref::new("SnowDatacenterConfig", "test"),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn owner_reference_points_at_cluster() {
        let owner = sample_cluster().owner_reference();
        assert_eq!(owner.api_version, "anywhere.eks.amazonaws.com/v1alpha1");
        assert_eq!(owner.kind, "Cluster");
        assert_eq!(owner.name, "snow-test");
        assert_eq!(owner.uid, "uid-1234");
        assert_eq!(owner.controller, None);
    }

    #[test]
    fn cluster_without_management_cluster_is_self_managed() {
        let mut cluster = sample_cluster();
        assert!(cluster.is_self_managed());

        cluster.set_managed_by("snow-test");
        assert!(cluster.is_self_managed());

        cluster.set_managed_by("mgmt");
        assert_eq!(cluster.managed_by(), "mgmt");
        assert!(!cluster.is_self_managed());
    }

    #[test]
    fn spec_deserializes_from_camel_case_yaml() {
        let yaml = r#"
kubernetesVersion: "1.21"
controlPlaneConfiguration:
  count: 3
  endpoint:
    host: 1.2.3.4
  machineGroupRef:
    kind: SnowMachineConfig
    name: test-cp
workerNodeGroupConfigurations:
  - name: md-0
    count: 3
    machineGroupRef:
      kind: SnowMachineConfig
      name: test-wn
datacenterRef:
  kind: SnowDatacenterConfig
  name: test
clusterNetwork:
  pods:
    cidrBlocks: ["10.1.0.0/16"]
  services:
    cidrBlocks: ["10.96.0.0/12"]
registryMirrorConfiguration:
  endpoint: 1.2.3.4
  port: "443"
  insecureSkipVerify: true
identityProviderRefs:
  - kind: OIDCConfig
    name: my-oidc
"#;
        let spec: ClusterResourceSpec = serde_yaml::from_str(yaml).expect("valid yaml");
        assert_eq!(spec.control_plane_configuration.count, 3);
        assert_eq!(spec.worker_node_group_configurations[0].name, "md-0");
        assert_eq!(spec.cluster_network.pods.cidr_blocks, vec!["10.1.0.0/16"]);
        let mirror = spec.registry_mirror_configuration.expect("mirror set");
        assert!(mirror.insecure_skip_verify);
        assert_eq!(mirror.ca_cert_content, None);
        assert_eq!(spec.identity_provider_refs[0].kind, "OIDCConfig");
        assert_eq!(spec.management_cluster.name, "");
    }

    #[test]
    fn failure_message_reads_status() {
        let mut cluster = sample_cluster();
        assert_eq!(cluster.failure_message(), None);
        cluster.status = Some(ClusterStatus {
            failure_message: Some("invalid data center type x".to_string()),
        });
        assert_eq!(cluster.failure_message(), Some("invalid data center type x"));
    }

    /// The status schema only carries fields the controller actually writes
    #[test]
    fn status_schema_lists_only_failure_message() {
        use kube::CustomResourceExt;

        let crd = serde_json::to_value(Cluster::crd()).expect("serializes");
        let status = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]
            ["status"]["properties"];
        let fields: Vec<&str> = status
            .as_object()
            .expect("status properties")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(fields, vec!["failureMessage"]);
    }
}
