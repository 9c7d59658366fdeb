//! Shared types used across CRD definitions

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A reference to another object in the same namespace by kind and name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Ref {
    /// Kind of the referenced object (e.g., "SnowDatacenterConfig")
    pub kind: String,
    /// Name of the referenced object
    pub name: String,
}

impl Ref {
    /// Create a new reference
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// A container image split into repository and tag
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    /// Image repository (e.g., "public.ecr.aws/eks-distro/etcd-io")
    pub repository: String,
    /// Image tag (e.g., "v3.4.16-eks-1-21-9")
    pub tag: String,
}

impl Image {
    /// Create a new image
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Full pullable reference, `repository:tag`
    pub fn uri(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}
