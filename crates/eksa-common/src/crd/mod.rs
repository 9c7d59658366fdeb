//! Custom Resource Definitions for cluster lifecycle management

mod bundles;
mod cluster;
mod identity;
mod snow;
mod types;

pub use bundles::{Bundles, BundlesSpec, DockerBundle, EksDRelease, KubeDistro, VersionsBundle};
pub use cluster::{
    BundlesRef, CidrBlocks, Cluster, ClusterNetwork, ClusterResourceSpec, ClusterStatus,
    ControlPlaneConfiguration, Endpoint, ManagementCluster, ProxyConfiguration,
    RegistryMirrorConfiguration, WorkerNodeGroupConfiguration,
};
pub use identity::{
    AWSIamConfig, AWSIamConfigSpec, IdentityProviderKind, MapRoles, MapUsers, OIDCConfig,
    OIDCConfigRequiredClaim, OIDCConfigSpec,
};
pub use snow::{
    SnowMachineConfig, SnowMachineConfigSpec, DEFAULT_SNOW_INSTANCE_TYPE,
    DEFAULT_SNOW_PHYSICAL_NETWORK_CONNECTOR, DEFAULT_SNOW_SSH_KEY_NAME,
};
pub use types::{Image, Ref};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;

/// Every CRD this controller serves, in install order
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        Cluster::crd(),
        OIDCConfig::crd(),
        AWSIamConfig::crd(),
        SnowMachineConfig::crd(),
        Bundles::crd(),
    ]
}
