//! CAPI (Cluster API) manifest compilation and application
//!
//! This crate provides:
//! - Provider trait and compilers for infrastructure providers (Snow, Docker)
//! - CAPIClient for server-side applying the compiled manifests

#![deny(missing_docs)]

pub mod client;
pub mod provider;

pub use client::{CAPIClient, CAPIClientImpl};

#[cfg(test)]
pub use client::MockCAPIClient;

pub use provider::{
    CAPIManifest, CompiledCluster, CompiledWorkerGroup, DockerProvider, ManifestMetadata,
    Provider, SnowProvider, TemplateGenerations, WorkerGenerations,
};
