//! Defaults filled into a Cluster spec before validation

use eksa_capi::provider::registry_mirror::DEFAULT_MIRROR_PORT;
use eksa_common::ClusterSpec;

use super::Defaulter;

/// Fills registry mirror and Snow machine config defaults
#[derive(Clone, Copy, Debug, Default)]
pub struct SpecDefaulter;

impl SpecDefaulter {
    /// Create a new defaulter
    pub fn new() -> Self {
        Self
    }
}

impl Defaulter for SpecDefaulter {
    fn apply_defaults(&self, spec: ClusterSpec) -> ClusterSpec {
        spec.map_cluster(|cluster| {
            if let Some(mirror) = cluster.spec.registry_mirror_configuration.as_mut() {
                if mirror.port.is_empty() {
                    mirror.port = DEFAULT_MIRROR_PORT.to_string();
                }
            }
        })
        .map_machine_configs(|config| config.with_defaults())
    }
}
