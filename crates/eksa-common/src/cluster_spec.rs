//! The resolved cluster specification consumed by the manifest compilers
//!
//! A [`ClusterSpec`] bundles the Cluster object with everything resolved from
//! its references: the versions bundle for its Kubernetes version and the
//! machine configs its node groups point at. It is built once per
//! reconciliation and never mutated in place; defaulting produces a new value.

use std::collections::BTreeMap;

use kube::ResourceExt;

use crate::crd::{
    Cluster, ClusterResourceSpec, SnowMachineConfigSpec, VersionsBundle,
    WorkerNodeGroupConfiguration,
};
use crate::{Error, Result};

/// Cluster plus its resolved dependencies
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterSpec {
    cluster: Cluster,
    versions_bundle: VersionsBundle,
    machine_configs: BTreeMap<String, SnowMachineConfigSpec>,
}

impl ClusterSpec {
    /// Create a spec with no machine configs
    pub fn new(cluster: Cluster, versions_bundle: VersionsBundle) -> Self {
        Self {
            cluster,
            versions_bundle,
            machine_configs: BTreeMap::new(),
        }
    }

    /// Attach machine configs keyed by machine config name
    pub fn with_machine_configs(
        mut self,
        machine_configs: BTreeMap<String, SnowMachineConfigSpec>,
    ) -> Self {
        self.machine_configs = machine_configs;
        self
    }

    /// Return a copy with the cluster modified by `f`
    pub fn map_cluster(mut self, f: impl FnOnce(&mut Cluster)) -> Self {
        f(&mut self.cluster);
        self
    }

    /// Return a copy with every machine config replaced by `f(config)`
    pub fn map_machine_configs(
        mut self,
        f: impl Fn(SnowMachineConfigSpec) -> SnowMachineConfigSpec,
    ) -> Self {
        self.machine_configs = std::mem::take(&mut self.machine_configs)
            .into_iter()
            .map(|(name, config)| (name, f(config)))
            .collect();
        self
    }

    /// The Cluster object
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// The Cluster's spec
    pub fn spec(&self) -> &ClusterResourceSpec {
        &self.cluster.spec
    }

    /// Cluster name
    pub fn name(&self) -> String {
        self.cluster.name_any()
    }

    /// Namespace the Cluster object lives in
    pub fn namespace(&self) -> String {
        self.cluster.namespace().unwrap_or_default()
    }

    /// Versions bundle selected for the cluster's Kubernetes version
    pub fn versions_bundle(&self) -> &VersionsBundle {
        &self.versions_bundle
    }

    /// Distribution version used for control plane and machines, e.g. "v1.21.5-eks-1-21-9"
    pub fn kubernetes_version(&self) -> String {
        self.versions_bundle.eks_d.version()
    }

    /// Control plane endpoint host
    pub fn control_plane_endpoint_host(&self) -> &str {
        &self.cluster.spec.control_plane_configuration.endpoint.host
    }

    /// Worker node groups in declaration order
    pub fn worker_node_groups(&self) -> &[WorkerNodeGroupConfiguration] {
        &self.cluster.spec.worker_node_group_configurations
    }

    /// All resolved machine configs
    pub fn machine_configs(&self) -> &BTreeMap<String, SnowMachineConfigSpec> {
        &self.machine_configs
    }

    /// Machine config by name; a missing entry is a compile error
    pub fn machine_config(&self, name: &str) -> Result<&SnowMachineConfigSpec> {
        self.machine_configs.get(name).ok_or_else(|| {
            Error::manifest(self.name(), format!("no machine config named {name}"))
        })
    }

    /// Machine config of the control plane
    pub fn control_plane_machine_config(&self) -> Result<&SnowMachineConfigSpec> {
        let machine_ref = self
            .cluster
            .spec
            .control_plane_configuration
            .machine_group_ref
            .as_ref()
            .ok_or_else(|| {
                Error::manifest(self.name(), "control plane has no machineGroupRef")
            })?;
        self.machine_config(&machine_ref.name)
    }

    /// Machine config of a worker node group
    pub fn worker_machine_config(
        &self,
        group: &WorkerNodeGroupConfiguration,
    ) -> Result<&SnowMachineConfigSpec> {
        let machine_ref = group.machine_group_ref.as_ref().ok_or_else(|| {
            Error::manifest(
                self.name(),
                format!("worker node group {} has no machineGroupRef", group.name),
            )
        })?;
        self.machine_config(&machine_ref.name)
    }
}
