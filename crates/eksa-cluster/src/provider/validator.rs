//! Cluster spec validation run after defaulting

use std::collections::BTreeSet;

use eksa_common::crd::Ref;
use eksa_common::{ClusterSpec, Error, Result, SNOW_DATACENTER_KIND};

use super::Validator;

/// Checks a defaulted spec before anything is compiled or applied
///
/// Every failure is a validation error naming the offending field, so the
/// message surfaced in the Cluster status tells the user what to fix.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecValidator;

impl SpecValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }
}

impl Validator for SpecValidator {
    fn validate(&self, spec: &ClusterSpec) -> Result<()> {
        let name = spec.name();
        let cluster = spec.spec();
        let control_plane = &cluster.control_plane_configuration;

        if control_plane.count < 1 {
            return Err(Error::validation_for_field(
                &name,
                "spec.controlPlaneConfiguration.count",
                format!("control plane count must be at least 1, got {}", control_plane.count),
            ));
        }

        if control_plane.endpoint.host.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.controlPlaneConfiguration.endpoint.host",
                "control plane endpoint host is required",
            ));
        }

        if cluster.cluster_network.pods.cidr_blocks.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.clusterNetwork.pods.cidrBlocks",
                "at least one pod CIDR is required",
            ));
        }

        if cluster.cluster_network.services.cidr_blocks.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.clusterNetwork.services.cidrBlocks",
                "at least one service CIDR is required",
            ));
        }

        let mut group_names = BTreeSet::new();
        for group in spec.worker_node_groups() {
            if !group_names.insert(group.name.as_str()) {
                return Err(Error::validation_for_field(
                    &name,
                    "spec.workerNodeGroupConfigurations",
                    format!("worker node group name {} is not unique", group.name),
                ));
            }
        }

        if cluster.datacenter_ref.kind == SNOW_DATACENTER_KIND {
            validate_snow_machines(spec)?;
        }

        Ok(())
    }
}

fn validate_snow_machines(spec: &ClusterSpec) -> Result<()> {
    let name = spec.name();
    let cluster = spec.spec();

    let control_plane_ref = cluster.control_plane_configuration.machine_group_ref.as_ref();
    check_machine_ref(
        spec,
        "spec.controlPlaneConfiguration.machineGroupRef",
        control_plane_ref,
    )?;
    for group in spec.worker_node_groups() {
        check_machine_ref(
            spec,
            &format!("spec.workerNodeGroupConfigurations[{}].machineGroupRef", group.name),
            group.machine_group_ref.as_ref(),
        )?;
    }

    for (config_name, config) in spec.machine_configs() {
        if config.ami_id.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.amiID",
                format!("SnowMachineConfig {config_name} has no amiID"),
            ));
        }
        if config.devices.is_empty() {
            return Err(Error::validation_for_field(
                &name,
                "spec.devices",
                format!("SnowMachineConfig {config_name} lists no devices"),
            ));
        }
    }

    Ok(())
}

fn check_machine_ref(spec: &ClusterSpec, field: &str, machine_ref: Option<&Ref>) -> Result<()> {
    let machine_ref = machine_ref.ok_or_else(|| {
        Error::validation_for_field(spec.name(), field, "machineGroupRef is required")
    })?;
    if !spec.machine_configs().contains_key(&machine_ref.name) {
        return Err(Error::validation_for_field(
            spec.name(),
            field,
            format!("{} {} is not resolvable", machine_ref.kind, machine_ref.name),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{cluster, versions_bundle};
    use eksa_common::crd::{SnowMachineConfigSpec, WorkerNodeGroupConfiguration};
    use std::collections::BTreeMap;

    fn machine_config() -> SnowMachineConfigSpec {
        SnowMachineConfigSpec {
            ami_id: "ami-1".to_string(),
            devices: vec!["1.2.3.4".to_string()],
            ..Default::default()
        }
        .with_defaults()
    }

    fn valid_spec() -> ClusterSpec {
        ClusterSpec::new(cluster("SnowDatacenterConfig"), versions_bundle()).with_machine_configs(
            BTreeMap::from([
                ("test-cp".to_string(), machine_config()),
                ("test-wn".to_string(), machine_config()),
            ]),
        )
    }

    fn field_of(err: &Error) -> Option<&str> {
        match err {
            Error::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    #[test]
    fn valid_spec_passes() {
        assert!(SpecValidator::new().validate(&valid_spec()).is_ok());
    }

    #[test]
    fn zero_control_plane_nodes_is_rejected() {
        let spec = valid_spec().map_cluster(|c| c.spec.control_plane_configuration.count = 0);
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(field_of(&err), Some("spec.controlPlaneConfiguration.count"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_endpoint_host_is_rejected() {
        let spec =
            valid_spec().map_cluster(|c| c.spec.control_plane_configuration.endpoint.host.clear());
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(
            field_of(&err),
            Some("spec.controlPlaneConfiguration.endpoint.host")
        );
    }

    #[test]
    fn empty_networks_are_rejected() {
        let spec = valid_spec().map_cluster(|c| c.spec.cluster_network.pods.cidr_blocks.clear());
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(field_of(&err), Some("spec.clusterNetwork.pods.cidrBlocks"));

        let spec =
            valid_spec().map_cluster(|c| c.spec.cluster_network.services.cidr_blocks.clear());
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(field_of(&err), Some("spec.clusterNetwork.services.cidrBlocks"));
    }

    #[test]
    fn duplicate_worker_group_names_are_rejected() {
        let spec = valid_spec().map_cluster(|c| {
            let group = c.spec.worker_node_group_configurations[0].clone();
            c.spec.worker_node_group_configurations.push(WorkerNodeGroupConfiguration {
                count: 1,
                ..group
            });
        });
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert!(err.to_string().contains("md-0 is not unique"));
    }

    #[test]
    fn unresolvable_machine_ref_is_rejected() {
        let spec = valid_spec().map_cluster(|c| {
            c.spec.worker_node_group_configurations[0].machine_group_ref =
                Some(Ref::new("SnowMachineConfig", "missing"));
        });
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert!(err.to_string().contains("SnowMachineConfig missing is not resolvable"));
    }

    #[test]
    fn snow_machine_config_needs_ami_and_devices() {
        let spec = valid_spec().map_machine_configs(|mut c| {
            c.devices.clear();
            c
        });
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(field_of(&err), Some("spec.devices"));

        let spec = valid_spec().map_machine_configs(|mut c| {
            c.ami_id.clear();
            c
        });
        let err = SpecValidator::new().validate(&spec).unwrap_err();
        assert_eq!(field_of(&err), Some("spec.amiID"));
    }

    #[test]
    fn docker_clusters_need_no_machine_configs() {
        let spec = ClusterSpec::new(cluster("DockerDatacenterConfig"), versions_bundle());
        assert!(SpecValidator::new().validate(&spec).is_ok());
    }
}
