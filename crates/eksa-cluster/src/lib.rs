//! Cluster reconciliation for EKS Anywhere
//!
//! The [`controller`] reconciles Cluster resources: it keeps referenced
//! identity provider objects owned by their Cluster and dispatches the rest
//! of the work to a [`provider`] reconciler chosen by datacenter kind.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod provider;

pub use client::{KubeClient, KubeClientImpl};
pub use controller::{
    error_policy, reconcile, reconcile_cluster, Context, ContextBuilder, ObjectKey,
};
pub use provider::{ProviderClusterReconciler, ProviderDeps, ProviderRegistry, ReconcileResult};

pub use eksa_common::{Error, Result};
