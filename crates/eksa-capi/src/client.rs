//! CAPI (Cluster API) client for applying generated manifests
//!
//! Provides a trait-based abstraction so reconcilers can be tested against a
//! mock while production code applies manifests with server-side apply.

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::provider::CAPIManifest;
use eksa_common::kube_utils::build_api_resource;
use eksa_common::{Error, FIELD_MANAGER};

/// Trait abstracting CAPI resource operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CAPIClient: Send + Sync {
    /// Server-side apply each manifest, in order, into `namespace`
    ///
    /// Stops at the first failure; manifests already applied stay applied and
    /// the next reconciliation converges the rest.
    async fn apply_manifests(&self, manifests: &[CAPIManifest], namespace: &str)
        -> Result<(), Error>;

    /// Fetch the spec of an existing object, or None if it does not exist
    async fn get_spec(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<serde_json::Value>, Error>;
}

/// Real CAPI client implementation using DynamicObject for untyped resources
pub struct CAPIClientImpl {
    client: Client,
}

impl CAPIClientImpl {
    /// Create a new CAPIClientImpl
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, api_version: &str, kind: &str, namespace: &str) -> Api<DynamicObject> {
        let ar = build_api_resource(api_version, kind);
        Api::namespaced_with(self.client.clone(), namespace, &ar)
    }

    async fn apply_manifest(&self, manifest: &CAPIManifest, namespace: &str) -> Result<(), Error> {
        let obj = manifest_to_object(manifest, namespace)?;
        let api = self.api(&manifest.api_version, &manifest.kind, namespace);

        api.patch(
            &manifest.metadata.name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&obj),
        )
        .await?;

        info!(
            kind = %manifest.kind,
            name = %manifest.metadata.name,
            namespace = %namespace,
            "Applied CAPI manifest"
        );

        Ok(())
    }
}

#[async_trait]
impl CAPIClient for CAPIClientImpl {
    async fn apply_manifests(
        &self,
        manifests: &[CAPIManifest],
        namespace: &str,
    ) -> Result<(), Error> {
        for manifest in manifests {
            self.apply_manifest(manifest, namespace).await?;
        }
        Ok(())
    }

    async fn get_spec(
        &self,
        api_version: &str,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<Option<serde_json::Value>, Error> {
        match self.api(api_version, kind, namespace).get_opt(name).await? {
            Some(obj) => Ok(obj.data.get("spec").cloned()),
            None => {
                debug!(kind = %kind, name = %name, namespace = %namespace, "object not found");
                Ok(None)
            }
        }
    }
}

/// Convert a manifest into the object sent with server-side apply
fn manifest_to_object(manifest: &CAPIManifest, namespace: &str) -> Result<DynamicObject, Error> {
    let mut obj_value = serde_json::json!({
        "apiVersion": manifest.api_version,
        "kind": manifest.kind,
        "metadata": build_manifest_metadata(
            &manifest.metadata.name,
            namespace,
            &manifest.metadata.labels,
            &manifest.metadata.annotations,
        ),
    });

    if let Some(ref spec) = manifest.spec {
        obj_value["spec"] = spec.clone();
    }

    serde_json::from_value(obj_value)
        .map_err(|e| Error::serialization_for_kind(manifest.kind.clone(), e.to_string()))
}

fn build_manifest_metadata(
    name: &str,
    namespace: &str,
    labels: &Option<BTreeMap<String, String>>,
    annotations: &Option<BTreeMap<String, String>>,
) -> serde_json::Value {
    let mut metadata = serde_json::json!({
        "name": name,
        "namespace": namespace,
    });

    if let Some(labels) = labels {
        metadata["labels"] = serde_json::json!(labels);
    }
    if let Some(annotations) = annotations {
        metadata["annotations"] = serde_json::json!(annotations);
    }

    metadata
}
