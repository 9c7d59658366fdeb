//! Common types for the EKS Anywhere cluster controller: CRDs, errors and utilities

#![deny(missing_docs)]

pub mod cluster_spec;
pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod telemetry;

pub use cluster_spec::ClusterSpec;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace every generated Cluster API object lives in
pub const EKSA_SYSTEM_NAMESPACE: &str = "eksa-system";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "eksa-controller";

/// Datacenter kind served by the Snow provider
pub const SNOW_DATACENTER_KIND: &str = "SnowDatacenterConfig";

/// Datacenter kind served by the Docker provider
pub const DOCKER_DATACENTER_KIND: &str = "DockerDatacenterConfig";

/// Label carrying the Cluster API cluster name
pub const CAPI_CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

/// Label carrying the name of the owning Cluster object
pub const CLUSTER_NAME_LABEL: &str = "cluster.anywhere.eks.amazonaws.com/cluster-name";

/// Label carrying the namespace of the owning Cluster object
pub const CLUSTER_NAMESPACE_LABEL: &str = "cluster.anywhere.eks.amazonaws.com/cluster-namespace";
