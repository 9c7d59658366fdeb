//! Snow provider machine configuration CRD

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default Snow instance type
pub const DEFAULT_SNOW_INSTANCE_TYPE: &str = "sbe-c.large";
/// Default SSH key name on Snow devices
pub const DEFAULT_SNOW_SSH_KEY_NAME: &str = "default";
/// Default physical network connector type
pub const DEFAULT_SNOW_PHYSICAL_NETWORK_CONNECTOR: &str = "SFP_PLUS";

/// Machine configuration for Snow devices
///
/// Referenced from a Cluster's control plane and worker groups through
/// `machineGroupRef`.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "anywhere.eks.amazonaws.com",
    version = "v1alpha1",
    kind = "SnowMachineConfig",
    plural = "snowmachineconfigs",
    namespaced,
    printcolumn = r#"{"name":"Instance","type":"string","jsonPath":".spec.instanceType"}"#,
    printcolumn = r#"{"name":"AMI","type":"string","jsonPath":".spec.amiID"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SnowMachineConfigSpec {
    /// AMI the machines boot from
    #[serde(rename = "amiID", default)]
    pub ami_id: String,

    /// Snow instance type (e.g., "sbe-c.large")
    #[serde(default)]
    pub instance_type: String,

    /// SSH key name registered on the devices
    #[serde(default)]
    pub ssh_key_name: String,

    /// Physical network connector type (SFP_PLUS, QSFP, RJ45)
    #[serde(default)]
    pub physical_network_connector: String,

    /// Snow device IPs machines may be placed on
    #[serde(default)]
    pub devices: Vec<String>,
}

impl SnowMachineConfigSpec {
    /// Fill unset fields with Snow defaults
    pub fn with_defaults(mut self) -> Self {
        if self.instance_type.is_empty() {
            self.instance_type = DEFAULT_SNOW_INSTANCE_TYPE.to_string();
        }
        if self.ssh_key_name.is_empty() {
            self.ssh_key_name = DEFAULT_SNOW_SSH_KEY_NAME.to_string();
        }
        if self.physical_network_connector.is_empty() {
            self.physical_network_connector = DEFAULT_SNOW_PHYSICAL_NETWORK_CONNECTOR.to_string();
        }
        self
    }
}
