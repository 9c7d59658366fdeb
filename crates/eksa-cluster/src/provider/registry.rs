//! Datacenter kind → provider reconciler dispatch

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use eksa_common::{Error, Result, DOCKER_DATACENTER_KIND, SNOW_DATACENTER_KIND};

use super::{
    DockerClusterReconciler, ProviderClusterReconciler, ProviderDeps, SnowClusterReconciler,
};

/// Builds a provider reconciler from its collaborators
pub type ProviderConstructor =
    Arc<dyn Fn(&ProviderDeps) -> Arc<dyn ProviderClusterReconciler> + Send + Sync>;

/// Maps datacenter kinds to provider reconciler constructors
///
/// Built once at start-up and shared. Supporting a new infrastructure means
/// registering one more kind; the controller does not change.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry serving every built-in provider
    pub fn with_defaults() -> Self {
        Self::new()
            .register(SNOW_DATACENTER_KIND, |deps: &ProviderDeps| {
                Arc::new(SnowClusterReconciler::new(deps.clone()))
                    as Arc<dyn ProviderClusterReconciler>
            })
            .register(DOCKER_DATACENTER_KIND, |deps: &ProviderDeps| {
                Arc::new(DockerClusterReconciler::new(deps.clone()))
                    as Arc<dyn ProviderClusterReconciler>
            })
    }

    /// Serve `kind` with reconcilers built by `constructor`
    ///
    /// Registering a kind again replaces the earlier constructor.
    pub fn register<F>(mut self, kind: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&ProviderDeps) -> Arc<dyn ProviderClusterReconciler> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
        self
    }

    /// Build the reconciler serving `kind`
    ///
    /// An unknown kind fails with `invalid data center type <kind>`.
    pub fn build(
        &self,
        kind: &str,
        deps: &ProviderDeps,
    ) -> Result<Arc<dyn ProviderClusterReconciler>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| Error::unsupported_datacenter(kind))?;
        Ok(constructor(deps))
    }

    /// Registered datacenter kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
