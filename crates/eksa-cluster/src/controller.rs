//! Cluster controller
//!
//! Reconciles the user-facing Cluster resource. Provider-agnostic concerns are
//! handled here: identity provider objects referenced by the Cluster are kept
//! owned by it, and fatal configuration errors are surfaced on
//! `status.failureMessage`. Everything infrastructure-specific is delegated to
//! the provider reconciler the [`ProviderRegistry`] builds for the Cluster's
//! datacenter kind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::client::{KubeClient, KubeClientImpl};
use crate::provider::{
    Defaulter, KubeconfigSecretTracker, ProviderDeps, ProviderRegistry, ReconcileResult,
    RemoteClusterTracker, SpecDefaulter, SpecValidator, Validator,
};
use eksa_capi::{CAPIClient, CAPIClientImpl};
use eksa_common::crd::{Cluster, ClusterStatus, IdentityProviderKind};
use eksa_common::kube_utils::ensure_owner_reference;
use eksa_common::{Error, Result};

/// Interval used when a provider asks for a requeue without a delay
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(300);

/// Delay before retrying a reconciliation that failed with a retryable error
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Namespace and name identifying a Cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
}

impl ObjectKey {
    /// Create a key from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an existing Cluster
    pub fn for_cluster(cluster: &Cluster) -> Self {
        Self::new(cluster.namespace().unwrap_or_default(), cluster.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Shared context for the Cluster controller
///
/// Built once at start-up with [`ContextBuilder`] and shared by every
/// reconciliation.
///
/// ```text
/// let ctx = Context::builder(client)
///     .requeue_interval(Duration::from_secs(60))
///     .build();
/// ```
pub struct Context {
    /// Store client (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Applies compiled Cluster API manifests
    pub capi: Arc<dyn CAPIClient>,
    /// Datacenter kind → provider reconciler
    pub registry: Arc<ProviderRegistry>,
    /// Spec validator handed to providers
    pub validator: Arc<dyn Validator>,
    /// Spec defaulter handed to providers
    pub defaulter: Arc<dyn Defaulter>,
    /// Workload cluster reachability handed to providers
    pub tracker: Arc<dyn RemoteClusterTracker>,
    /// Delay for requeues that do not name one
    pub requeue_interval: Duration,
    /// Delay before retrying a retryable failure
    pub error_backoff: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Context with every default collaborator
    pub fn new(client: Client) -> Self {
        Self::builder(client).build()
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn KubeClient>,
        capi: Arc<dyn CAPIClient>,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            tracker: Arc::new(KubeconfigSecretTracker::new(kube.clone())),
            kube,
            capi,
            registry: Arc::new(registry),
            validator: Arc::new(SpecValidator::new()),
            defaulter: Arc::new(SpecDefaulter::new()),
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Collaborators handed to the provider reconciler
    pub fn provider_deps(&self) -> ProviderDeps {
        ProviderDeps {
            kube: self.kube.clone(),
            capi: self.capi.clone(),
            validator: self.validator.clone(),
            defaulter: self.defaulter.clone(),
            tracker: self.tracker.clone(),
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// Every collaborator not set explicitly is created from the client.
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    capi: Option<Arc<dyn CAPIClient>>,
    registry: Option<Arc<ProviderRegistry>>,
    validator: Option<Arc<dyn Validator>>,
    defaulter: Option<Arc<dyn Defaulter>>,
    tracker: Option<Arc<dyn RemoteClusterTracker>>,
    requeue_interval: Duration,
    error_backoff: Duration,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            capi: None,
            registry: None,
            validator: None,
            defaulter: None,
            tracker: None,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    /// Override the store client
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the CAPI client
    pub fn capi_client(mut self, capi: Arc<dyn CAPIClient>) -> Self {
        self.capi = Some(capi);
        self
    }

    /// Serve datacenter kinds from `registry` instead of the built-in providers
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the spec validator
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Override the spec defaulter
    pub fn defaulter(mut self, defaulter: Arc<dyn Defaulter>) -> Self {
        self.defaulter = Some(defaulter);
        self
    }

    /// Override the workload cluster tracker
    pub fn tracker(mut self, tracker: Arc<dyn RemoteClusterTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Delay for requeues that do not name one
    pub fn requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    /// Delay before retrying a retryable failure
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube = self
            .kube
            .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone())));
        let tracker = self
            .tracker
            .unwrap_or_else(|| Arc::new(KubeconfigSecretTracker::new(kube.clone())));

        Context {
            capi: self
                .capi
                .unwrap_or_else(|| Arc::new(CAPIClientImpl::new(self.client.clone()))),
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ProviderRegistry::with_defaults())),
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(SpecValidator::new())),
            defaulter: self
                .defaulter
                .unwrap_or_else(|| Arc::new(SpecDefaulter::new())),
            tracker,
            kube,
            requeue_interval: self.requeue_interval,
            error_backoff: self.error_backoff,
        }
    }
}

/// Reconcile the Cluster identified by `key`
///
/// A Cluster that no longer exists needs nothing. Otherwise identity provider
/// ownership is enforced and the Cluster is handed to its provider. Errors
/// the user has to fix are also written to `status.failureMessage`; a
/// successful pass clears a message left by an earlier failure.
pub async fn reconcile_cluster(key: &ObjectKey, ctx: &Context) -> Result<ReconcileResult> {
    let Some(cluster) = ctx.kube.get_cluster(&key.namespace, &key.name).await? else {
        debug!(cluster = %key, "cluster no longer exists");
        return Ok(ReconcileResult::default());
    };

    match reconcile_existing(&cluster, ctx).await {
        Ok(result) => {
            clear_failure(&cluster, ctx.kube.as_ref()).await?;
            Ok(result)
        }
        Err(e) => {
            if !e.is_retryable() {
                record_failure(&cluster, ctx.kube.as_ref(), &e).await;
            }
            Err(e)
        }
    }
}

async fn reconcile_existing(cluster: &Cluster, ctx: &Context) -> Result<ReconcileResult> {
    ensure_identity_provider_owner_refs(cluster, ctx.kube.as_ref()).await?;

    let datacenter_kind = &cluster.spec.datacenter_ref.kind;
    let provider = ctx.registry.build(datacenter_kind, &ctx.provider_deps())?;
    debug!(datacenter = %datacenter_kind, provider = provider.name(), "dispatching to provider");

    provider.reconcile(cluster).await
}

/// Make the Cluster an owner of every identity provider object it references
///
/// Objects are only written when their owner reference list actually changes.
async fn ensure_identity_provider_owner_refs(
    cluster: &Cluster,
    kube: &dyn KubeClient,
) -> Result<()> {
    let namespace = cluster.namespace().unwrap_or_default();
    let owner = cluster.owner_reference();

    for identity_ref in &cluster.spec.identity_provider_refs {
        let kind: IdentityProviderKind = identity_ref.kind.parse().map_err(|_| {
            Error::validation_for_field(
                cluster.name_any(),
                "spec.identityProviderRefs",
                format!("unsupported identity provider kind {}", identity_ref.kind),
            )
        })?;

        let resource = kind.api_resource();
        let mut object = kube
            .get_object(&resource, &namespace, &identity_ref.name)
            .await?
            .ok_or_else(|| Error::not_found(kind.as_str(), &namespace, &identity_ref.name))?;

        if ensure_owner_reference(&mut object.metadata, owner.clone()) {
            kube.update_object(&resource, &object).await?;
            info!(kind = %kind, name = %identity_ref.name, "added cluster owner reference");
        }
    }

    Ok(())
}

/// Surface a fatal error to the user
///
/// A failed status write is logged; the reconcile error is what gets returned.
async fn record_failure(cluster: &Cluster, kube: &dyn KubeClient, err: &Error) {
    let message = err.to_string();
    if cluster.failure_message() == Some(message.as_str()) {
        return;
    }

    let status = ClusterStatus {
        failure_message: Some(message),
    };
    let namespace = cluster.namespace().unwrap_or_default();
    if let Err(e) = kube
        .patch_cluster_status(&namespace, &cluster.name_any(), &status)
        .await
    {
        warn!(error = %e, "failed to record failure message");
    }
}

async fn clear_failure(cluster: &Cluster, kube: &dyn KubeClient) -> Result<()> {
    if cluster.failure_message().is_none() {
        return Ok(());
    }

    let namespace = cluster.namespace().unwrap_or_default();
    kube.patch_cluster_status(&namespace, &cluster.name_any(), &ClusterStatus::default())
        .await?;
    info!("cleared failure message");
    Ok(())
}

/// Reconcile a Cluster for the kube-runtime controller
#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
pub async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Context>) -> Result<Action> {
    let result = reconcile_cluster(&ObjectKey::for_cluster(&cluster), &ctx).await?;
    Ok(result.to_action(ctx.requeue_interval))
}

/// Decide what to do after a failed reconciliation
///
/// Retryable errors are retried after the configured backoff. Configuration
/// errors wait for the user to change the Cluster.
pub fn error_policy(cluster: Arc<Cluster>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_retryable() {
        warn!(%error, cluster = %cluster.name_any(), "reconciliation failed, retrying");
        Action::requeue(ctx.error_backoff)
    } else {
        error!(%error, cluster = %cluster.name_any(), "reconciliation failed");
        Action::await_change()
    }
}
