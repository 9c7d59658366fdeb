//! Docker infrastructure provider
//!
//! Runs every node as a kind container on the management host. Used for local
//! development and tests; machine configs are ignored and all machines share
//! the kind node image from the versions bundle.

use std::collections::BTreeMap;

use eksa_common::crd::DockerBundle;
use eksa_common::{ClusterSpec, Error, Result};
use serde_json::json;

use super::{
    control_plane_template_name, generate_cluster, generate_kubeadm_config_template,
    generate_kubeadm_control_plane, generate_machine_deployment, labeled_manifest,
    worker_template_name, CAPIManifest, CompiledCluster, CompiledWorkerGroup, NodeBootstrap,
    Provider, TemplateGenerations, CAPI_INFRASTRUCTURE_API_VERSION,
};

/// Infrastructure cluster kind
pub const DOCKER_CLUSTER_KIND: &str = "DockerCluster";
/// Machine template kind
pub const DOCKER_MACHINE_TEMPLATE_KIND: &str = "DockerMachineTemplate";

const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Disable disk-pressure eviction; kind nodes share the host disk
const EVICTION_HARD: &str = "nodefs.available<0%,nodefs.inodesFree<0%,imagefs.available<0%";

/// Docker provider compiler
#[derive(Clone, Copy, Debug, Default)]
pub struct DockerProvider;

impl DockerProvider {
    /// Create a new Docker provider
    pub fn new() -> Self {
        Self
    }
}

impl Provider for DockerProvider {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn compile(
        &self,
        spec: &ClusterSpec,
        generations: &TemplateGenerations,
    ) -> Result<CompiledCluster> {
        let cluster_name = spec.name();
        let bundle = docker_bundle(spec)?;
        let bootstrap = node_bootstrap();

        let infrastructure_cluster = docker_cluster(spec, bundle);
        let control_plane_template = docker_machine_template(
            spec,
            control_plane_template_name(&cluster_name, generations.control_plane()),
            bundle,
        );
        let control_plane =
            generate_kubeadm_control_plane(spec, &control_plane_template, &bootstrap);
        let cluster = generate_cluster(spec, &infrastructure_cluster, &control_plane);

        let workers = spec
            .worker_node_groups()
            .iter()
            .map(|group| {
                let worker_generations = generations.worker(&group.name);
                let machine_template = docker_machine_template(
                    spec,
                    worker_template_name(
                        &cluster_name,
                        &group.name,
                        worker_generations.machine_template,
                    ),
                    bundle,
                );
                let kubeadm_config_template = generate_kubeadm_config_template(
                    spec,
                    worker_template_name(
                        &cluster_name,
                        &group.name,
                        worker_generations.kubeadm_config,
                    ),
                    &bootstrap,
                );
                let machine_deployment = generate_machine_deployment(
                    spec,
                    group,
                    &kubeadm_config_template,
                    &machine_template,
                );
                CompiledWorkerGroup {
                    name: group.name.clone(),
                    kubeadm_config_template,
                    machine_template,
                    machine_deployment,
                }
            })
            .collect();

        Ok(CompiledCluster {
            cluster,
            infrastructure_cluster,
            control_plane_template,
            control_plane,
            workers,
        })
    }
}

fn docker_bundle(spec: &ClusterSpec) -> Result<&DockerBundle> {
    spec.versions_bundle().docker.as_ref().ok_or_else(|| {
        Error::manifest(
            spec.name(),
            format!(
                "versions bundle for kubernetes {} has no docker images",
                spec.spec().kubernetes_version
            ),
        )
    })
}

/// Generate the DockerCluster with its haproxy load balancer
fn docker_cluster(spec: &ClusterSpec, bundle: &DockerBundle) -> CAPIManifest {
    labeled_manifest(
        spec,
        CAPI_INFRASTRUCTURE_API_VERSION,
        DOCKER_CLUSTER_KIND,
        spec.name(),
    )
    .with_spec(json!({
        "loadBalancer": {
            "imageRepository": bundle.haproxy.repository,
            "imageTag": bundle.haproxy.tag
        }
    }))
}

fn docker_machine_template(
    spec: &ClusterSpec,
    name: impl Into<String>,
    bundle: &DockerBundle,
) -> CAPIManifest {
    labeled_manifest(
        spec,
        CAPI_INFRASTRUCTURE_API_VERSION,
        DOCKER_MACHINE_TEMPLATE_KIND,
        name,
    )
    .with_spec(json!({
        "template": {
            "spec": {
                "extraMounts": [{
                    "containerPath": DOCKER_SOCKET,
                    "hostPath": DOCKER_SOCKET
                }],
                "customImage": bundle.kind_node.uri()
            }
        }
    }))
}

fn node_bootstrap() -> NodeBootstrap {
    NodeBootstrap {
        kubelet_extra_args: BTreeMap::from([
            ("eviction-hard".to_string(), EVICTION_HARD.to_string()),
            ("cgroup-driver".to_string(), "cgroupfs".to_string()),
        ]),
        ..Default::default()
    }
}
