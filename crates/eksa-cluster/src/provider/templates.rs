//! Generation selection for immutable machine and bootstrap templates
//!
//! Machine templates and KubeadmConfigTemplates cannot change once machines
//! were created from them. The live KubeadmControlPlane and MachineDeployments
//! name the templates currently in use; when the desired template no longer
//! matches the live one, the next generation is created under a new name and
//! the owning object is pointed at it, which rolls the machines.

use serde_json::Value;
use tracing::debug;

use eksa_capi::provider::{
    machine_deployment_name, parse_template_generation, CAPI_CLUSTER_API_VERSION,
    CAPI_CONTROLPLANE_API_VERSION,
};
use eksa_capi::{CAPIClient, CAPIManifest, Provider, TemplateGenerations, WorkerGenerations};
use eksa_common::{ClusterSpec, Result, EKSA_SYSTEM_NAMESPACE};

/// True when every field set in `desired` has the same value in `live`
///
/// The API server adds defaulted fields to stored objects, so equality is too
/// strict. Arrays must match element for element.
pub fn json_contains(live: &Value, desired: &Value) -> bool {
    match (live, desired) {
        (Value::Object(live), Value::Object(desired)) => desired.iter().all(|(key, value)| {
            live.get(key)
                .is_some_and(|live_value| json_contains(live_value, value))
        }),
        (Value::Array(live), Value::Array(desired)) => {
            live.len() == desired.len()
                && live
                    .iter()
                    .zip(desired)
                    .all(|(live_value, value)| json_contains(live_value, value))
        }
        _ => live == desired,
    }
}

/// Choose the template generations to compile with
///
/// Starts from the generations the live objects reference (1 for objects that
/// do not exist yet) and bumps each template whose desired spec differs from
/// its live spec.
pub async fn resolve_generations(
    capi: &dyn CAPIClient,
    provider: &dyn Provider,
    spec: &ClusterSpec,
) -> Result<TemplateGenerations> {
    let current = current_generations(capi, spec).await?;
    let desired = provider.compile(spec, &current)?;

    let mut resolved = current.clone();
    if !template_unchanged(capi, &desired.control_plane_template).await? {
        resolved = resolved.with_control_plane(current.control_plane() + 1);
    }

    for worker in &desired.workers {
        let generations = current.worker(&worker.name);
        let mut next = generations;
        if !template_unchanged(capi, &worker.machine_template).await? {
            next.machine_template += 1;
        }
        if !template_unchanged(capi, &worker.kubeadm_config_template).await? {
            next.kubeadm_config += 1;
        }
        if next != generations {
            debug!(group = %worker.name, ?next, "rotating worker templates");
        }
        resolved = resolved.with_worker(&worker.name, next);
    }

    Ok(resolved)
}

/// Generations referenced by the live control plane and machine deployments
async fn current_generations(
    capi: &dyn CAPIClient,
    spec: &ClusterSpec,
) -> Result<TemplateGenerations> {
    let cluster_name = spec.name();
    let mut generations = TemplateGenerations::default();

    let control_plane = capi
        .get_spec(
            CAPI_CONTROLPLANE_API_VERSION,
            "KubeadmControlPlane",
            &cluster_name,
            EKSA_SYSTEM_NAMESPACE,
        )
        .await?;
    if let Some(generation) = control_plane
        .as_ref()
        .and_then(|s| referenced_generation(&s["machineTemplate"]["infrastructureRef"]))
    {
        generations = generations.with_control_plane(generation);
    }

    for group in spec.worker_node_groups() {
        let machine_deployment = capi
            .get_spec(
                CAPI_CLUSTER_API_VERSION,
                "MachineDeployment",
                &machine_deployment_name(&cluster_name, &group.name),
                EKSA_SYSTEM_NAMESPACE,
            )
            .await?;
        let Some(machine_deployment) = machine_deployment else {
            continue;
        };

        let template_spec = &machine_deployment["template"]["spec"];
        let defaults = WorkerGenerations::default();
        generations = generations.with_worker(
            &group.name,
            WorkerGenerations {
                machine_template: referenced_generation(&template_spec["infrastructureRef"])
                    .unwrap_or(defaults.machine_template),
                kubeadm_config: referenced_generation(&template_spec["bootstrap"]["configRef"])
                    .unwrap_or(defaults.kubeadm_config),
            },
        );
    }

    Ok(generations)
}

fn referenced_generation(object_ref: &Value) -> Option<u64> {
    object_ref["name"].as_str().and_then(parse_template_generation)
}

/// A template that does not exist yet can be created under its current name
async fn template_unchanged(capi: &dyn CAPIClient, desired: &CAPIManifest) -> Result<bool> {
    let live = capi
        .get_spec(
            &desired.api_version,
            &desired.kind,
            &desired.metadata.name,
            EKSA_SYSTEM_NAMESPACE,
        )
        .await?;

    Ok(match (live, &desired.spec) {
        (None, _) => true,
        (Some(live), Some(desired_spec)) => json_contains(&live, desired_spec),
        (Some(_), None) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{cluster, versions_bundle, MockCAPIClient};
    use eksa_capi::SnowProvider;
    use eksa_common::crd::SnowMachineConfigSpec;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn spec() -> ClusterSpec {
        let config = SnowMachineConfigSpec {
            ami_id: "ami-1".to_string(),
            devices: vec!["1.2.3.4".to_string()],
            ..Default::default()
        }
        .with_defaults();
        ClusterSpec::new(cluster("SnowDatacenterConfig"), versions_bundle()).with_machine_configs(
            BTreeMap::from([
                ("test-cp".to_string(), config.clone()),
                ("test-wn".to_string(), config),
            ]),
        )
    }

    #[test]
    fn subset_ignores_server_defaulted_fields() {
        let live = json!({"template": {"spec": {"instanceType": "sbe-c.large", "extra": 1}}});
        let desired = json!({"template": {"spec": {"instanceType": "sbe-c.large"}}});
        assert!(json_contains(&live, &desired));
        assert!(!json_contains(&desired, &live));
    }

    #[test]
    fn subset_detects_changed_values_and_arrays() {
        let live = json!({"devices": ["1.2.3.4"], "instanceType": "sbe-c.large"});
        assert!(!json_contains(&live, &json!({"instanceType": "sbe-c.xlarge"})));
        assert!(!json_contains(&live, &json!({"devices": ["1.2.3.4", "1.2.3.5"]})));
        assert!(json_contains(&live, &json!({"devices": ["1.2.3.4"]})));
    }

    #[tokio::test]
    async fn new_cluster_starts_at_generation_one() {
        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec().returning(|_, _, _, _| Ok(None));

        let generations = resolve_generations(&capi, &SnowProvider::new(), &spec())
            .await
            .expect("resolves");
        assert_eq!(generations.control_plane(), 1);
        assert_eq!(generations.worker("md-0"), WorkerGenerations::default());
    }

    #[tokio::test]
    async fn unchanged_templates_keep_their_generation() {
        let spec = spec();
        let current = TemplateGenerations::default().with_control_plane(4).with_worker(
            "md-0",
            WorkerGenerations {
                machine_template: 2,
                kubeadm_config: 3,
            },
        );
        let compiled = SnowProvider::new().compile(&spec, &current).expect("compiles");
        let live: BTreeMap<String, Value> = compiled
            .manifests()
            .into_iter()
            .map(|m| (format!("{}/{}", m.kind, m.metadata.name), m.spec.unwrap_or_default()))
            .collect();

        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec()
            .returning(move |_, kind, name, _| Ok(live.get(&format!("{kind}/{name}")).cloned()));

        let generations = resolve_generations(&capi, &SnowProvider::new(), &spec)
            .await
            .expect("resolves");
        assert_eq!(generations, current);
    }

    #[tokio::test]
    async fn changed_machine_template_rotates_to_next_generation() {
        let spec = spec();
        let current = TemplateGenerations::default().with_control_plane(1).with_worker(
            "md-0",
            WorkerGenerations::default(),
        );
        let compiled = SnowProvider::new().compile(&spec, &current).expect("compiles");
        let mut live: BTreeMap<String, Value> = compiled
            .manifests()
            .into_iter()
            .map(|m| (format!("{}/{}", m.kind, m.metadata.name), m.spec.unwrap_or_default()))
            .collect();
        // The worker machines were created with a different instance type
        if let Some(template) = live.get_mut("AWSSnowMachineTemplate/snow-test-md-0-1") {
            template["template"]["spec"]["instanceType"] = json!("sbe-c.xlarge");
        }

        let mut capi = MockCAPIClient::new();
        capi.expect_get_spec()
            .returning(move |_, kind, name, _| Ok(live.get(&format!("{kind}/{name}")).cloned()));

        let generations = resolve_generations(&capi, &SnowProvider::new(), &spec)
            .await
            .expect("resolves");
        assert_eq!(generations.control_plane(), 1);
        assert_eq!(
            generations.worker("md-0"),
            WorkerGenerations {
                machine_template: 2,
                kubeadm_config: 1,
            }
        );
    }
}
