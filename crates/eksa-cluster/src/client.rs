//! Narrow store client used by the controller and provider reconcilers
//!
//! Everything the reconciliation core reads or writes goes through
//! [`KubeClient`], so tests can drive the controller with a mock.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::ApiResource;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;

#[cfg(test)]
use mockall::automock;

use eksa_common::crd::{Cluster, ClusterStatus};
use eksa_common::{Error, Result, FIELD_MANAGER};

/// Trait abstracting Kubernetes store operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a Cluster, or None if it does not exist
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>>;

    /// Get an untyped object, or None if it does not exist
    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Replace an object
    ///
    /// The object's `resourceVersion` makes this a conditional write; a stale
    /// version fails with a 409 conflict.
    async fn update_object(&self, resource: &ApiResource, object: &DynamicObject) -> Result<()>;

    /// Write a Cluster's status
    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClusterStatus,
    ) -> Result<()>;

    /// Get a Secret, or None if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>>;
}

/// Read a typed resource through the untyped client
///
/// Returns None when the object does not exist.
pub async fn get_resource<K>(
    kube: &dyn KubeClient,
    namespace: &str,
    name: &str,
) -> Result<Option<K>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    let Some(object) = kube.get_object(&resource, namespace, name).await? else {
        return Ok(None);
    };

    let value = serde_json::to_value(&object)
        .map_err(|e| Error::serialization_for_kind(resource.kind.clone(), e.to_string()))?;
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| Error::serialization_for_kind(resource.kind, e.to_string()))
}

/// Real store client backed by the Kubernetes API
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Cluster>> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        Ok(api.get_opt(name).await?)
    }

    async fn update_object(&self, resource: &ApiResource, object: &DynamicObject) -> Result<()> {
        let namespace = object.metadata.namespace.as_deref().unwrap_or_default();
        let name = object
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::internal_with_context("update_object", "object has no name"))?;

        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, resource);
        api.replace(name, &PostParams::default(), object).await?;
        Ok(())
    }

    async fn patch_cluster_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClusterStatus,
    ) -> Result<()> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);

        // An explicit null removes the field under merge-patch semantics
        let status_patch = serde_json::json!({
            "status": {
                "failureMessage": status.failure_message
            }
        });

        api.patch_status(
            name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
