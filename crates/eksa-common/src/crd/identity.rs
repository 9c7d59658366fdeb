//! Identity provider CRDs
//!
//! A Cluster references these through `spec.identityProviderRefs`; the
//! cluster controller keeps them owned by the Cluster.

use std::fmt;
use std::str::FromStr;

use kube::core::ApiResource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// OIDC identity provider configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "anywhere.eks.amazonaws.com",
    version = "v1alpha1",
    kind = "OIDCConfig",
    plural = "oidcconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OIDCConfigSpec {
    /// Client ID registered with the issuer
    pub client_id: String,
    /// Issuer URL
    pub issuer_url: String,
    /// JWT claim to use as the user's groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,
    /// Prefix prepended to group claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_prefix: Option<String>,
    /// JWT claim to use as the user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,
    /// Prefix prepended to username claims
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_prefix: Option<String>,
    /// Claims that must be present in the ID token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_claims: Vec<OIDCConfigRequiredClaim>,
}

/// A required claim key/value pair
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct OIDCConfigRequiredClaim {
    /// Claim name
    pub claim: String,
    /// Required value
    pub value: String,
}

/// AWS IAM authenticator configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "anywhere.eks.amazonaws.com",
    version = "v1alpha1",
    kind = "AWSIamConfig",
    plural = "awsiamconfigs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AWSIamConfigSpec {
    /// AWS region of the IAM authenticator
    pub aws_region: String,
    /// Backend modes (e.g., "EKSConfigMap")
    #[serde(default)]
    pub backend_mode: Vec<String>,
    /// IAM roles mapped to Kubernetes users and groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_roles: Vec<MapRoles>,
    /// IAM users mapped to Kubernetes users and groups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub map_users: Vec<MapUsers>,
    /// AWS partition
    #[serde(default = "default_partition")]
    pub partition: String,
}

fn default_partition() -> String {
    "aws".to_string()
}

/// IAM role mapping
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapRoles {
    /// Role ARN
    pub rolearn: String,
    /// Kubernetes user name
    pub username: String,
    /// Kubernetes groups
    #[serde(default)]
    pub groups: Vec<String>,
}

/// IAM user mapping
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapUsers {
    /// User ARN
    pub userarn: String,
    /// Kubernetes user name
    pub username: String,
    /// Kubernetes groups
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Kinds accepted in `spec.identityProviderRefs`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityProviderKind {
    /// OIDCConfig
    Oidc,
    /// AWSIamConfig
    AwsIam,
}

impl IdentityProviderKind {
    /// API resource used to read and update objects of this kind
    pub fn api_resource(&self) -> ApiResource {
        match self {
            IdentityProviderKind::Oidc => ApiResource::erase::<OIDCConfig>(&()),
            IdentityProviderKind::AwsIam => ApiResource::erase::<AWSIamConfig>(&()),
        }
    }

    /// Kind string as it appears in a reference
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProviderKind::Oidc => "OIDCConfig",
            IdentityProviderKind::AwsIam => "AWSIamConfig",
        }
    }
}

impl FromStr for IdentityProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OIDCConfig" => Ok(IdentityProviderKind::Oidc),
            "AWSIamConfig" => Ok(IdentityProviderKind::AwsIam),
            other => Err(crate::Error::validation(format!(
                "unsupported identity provider kind {other}"
            ))),
        }
    }
}

impl fmt::Display for IdentityProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
