//! Snow infrastructure provider
//!
//! Compiles clusters for AWS Snow devices using the CAPAS (Cluster API
//! Provider AWS Snow) kinds `AWSSnowCluster` and `AWSSnowMachineTemplate`.

use std::collections::BTreeMap;

use eksa_common::crd::SnowMachineConfigSpec;
use eksa_common::{ClusterSpec, Result};

use super::{
    control_plane_template_name, generate_cluster, generate_kubeadm_config_template,
    generate_kubeadm_control_plane, generate_machine_deployment, labeled_manifest,
    worker_template_name, CAPIManifest, CompiledCluster, CompiledWorkerGroup, NodeBootstrap,
    Provider, TemplateGenerations, CAPI_INFRASTRUCTURE_API_VERSION,
};

/// Infrastructure cluster kind
pub const SNOW_CLUSTER_KIND: &str = "AWSSnowCluster";
/// Machine template kind
pub const SNOW_MACHINE_TEMPLATE_KIND: &str = "AWSSnowMachineTemplate";

const SNOW_REGION: &str = "snow";
const CONTROL_PLANE_ENDPOINT_PORT: u16 = 6443;
const IAM_INSTANCE_PROFILE: &str = "control-plane.cluster-api-provider-aws.sigs.k8s.io";

/// Provider ID rendered by cloud-init from the instance metadata
const PROVIDER_ID_TEMPLATE: &str = "aws-snow:////'{{ ds.meta_data.instance_id }}'";

/// Snow provider compiler
#[derive(Clone, Copy, Debug, Default)]
pub struct SnowProvider;

impl SnowProvider {
    /// Create a new Snow provider
    pub fn new() -> Self {
        Self
    }
}

impl Provider for SnowProvider {
    fn name(&self) -> &'static str {
        "snow"
    }

    fn compile(
        &self,
        spec: &ClusterSpec,
        generations: &TemplateGenerations,
    ) -> Result<CompiledCluster> {
        let cluster_name = spec.name();

        let infrastructure_cluster = snow_cluster(spec);
        let control_plane_template = snow_machine_template(
            spec,
            control_plane_template_name(&cluster_name, generations.control_plane()),
            spec.control_plane_machine_config()?,
        );
        let control_plane = generate_kubeadm_control_plane(
            spec,
            &control_plane_template,
            &control_plane_bootstrap(spec),
        );
        let cluster = generate_cluster(spec, &infrastructure_cluster, &control_plane);

        let workers = spec
            .worker_node_groups()
            .iter()
            .map(|group| -> Result<CompiledWorkerGroup> {
                let worker_generations = generations.worker(&group.name);
                let machine_template = snow_machine_template(
                    spec,
                    worker_template_name(
                        &cluster_name,
                        &group.name,
                        worker_generations.machine_template,
                    ),
                    spec.worker_machine_config(group)?,
                );
                let kubeadm_config_template = generate_kubeadm_config_template(
                    spec,
                    worker_template_name(
                        &cluster_name,
                        &group.name,
                        worker_generations.kubeadm_config,
                    ),
                    &worker_bootstrap(),
                );
                let machine_deployment = generate_machine_deployment(
                    spec,
                    group,
                    &kubeadm_config_template,
                    &machine_template,
                );
                Ok(CompiledWorkerGroup {
                    name: group.name.clone(),
                    kubeadm_config_template,
                    machine_template,
                    machine_deployment,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompiledCluster {
            cluster,
            infrastructure_cluster,
            control_plane_template,
            control_plane,
            workers,
        })
    }
}

/// Generate the AWSSnowCluster
pub fn snow_cluster(spec: &ClusterSpec) -> CAPIManifest {
    labeled_manifest(
        spec,
        CAPI_INFRASTRUCTURE_API_VERSION,
        SNOW_CLUSTER_KIND,
        spec.name(),
    )
    .with_spec(serde_json::json!({
        "region": SNOW_REGION,
        "controlPlaneEndpoint": {
            "host": spec.control_plane_endpoint_host(),
            "port": CONTROL_PLANE_ENDPOINT_PORT
        }
    }))
}

/// Generate an AWSSnowMachineTemplate from a machine config
///
/// Control plane and worker templates share this builder; only the name and
/// machine config differ.
pub fn snow_machine_template(
    spec: &ClusterSpec,
    name: impl Into<String>,
    machine_config: &SnowMachineConfigSpec,
) -> CAPIManifest {
    labeled_manifest(
        spec,
        CAPI_INFRASTRUCTURE_API_VERSION,
        SNOW_MACHINE_TEMPLATE_KIND,
        name,
    )
    .with_spec(serde_json::json!({
        "template": {
            "spec": {
                "iamInstanceProfile": IAM_INSTANCE_PROFILE,
                "instanceType": machine_config.instance_type,
                "sshKeyName": machine_config.ssh_key_name,
                "ami": { "id": machine_config.ami_id },
                "cloudInit": { "insecureSkipSecretsManager": true },
                "physicalNetworkConnectorType": machine_config.physical_network_connector,
                "devices": machine_config.devices
            }
        }
    }))
}

fn provider_id_args() -> BTreeMap<String, String> {
    BTreeMap::from([("provider-id".to_string(), PROVIDER_ID_TEMPLATE.to_string())])
}

/// Control plane nodes start and finish kube-vip around kubeadm
fn control_plane_bootstrap(spec: &ClusterSpec) -> NodeBootstrap {
    let kube_vip = spec.versions_bundle().kube_vip.uri();
    let host = spec.control_plane_endpoint_host();
    NodeBootstrap {
        kubelet_extra_args: provider_id_args(),
        pre_kubeadm_commands: vec![format!("/etc/eks/bootstrap.sh {kube_vip} {host}")],
        post_kubeadm_commands: vec![format!("/etc/eks/bootstrap-after.sh {kube_vip} {host}")],
    }
}

fn worker_bootstrap() -> NodeBootstrap {
    NodeBootstrap {
        kubelet_extra_args: provider_id_args(),
        pre_kubeadm_commands: vec!["/etc/eks/bootstrap.sh".to_string()],
        post_kubeadm_commands: vec![],
    }
}
