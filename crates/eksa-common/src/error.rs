//! Error types for the cluster controller
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the cluster or object it concerns where one is known.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// API client error codes that clear up without a spec change
///
/// 404 and 410 cover objects deleted between a read and the following write,
/// 409 an optimistic-concurrency conflict, 429 API server throttling.
const RETRYABLE_CLIENT_CODES: &[u16] = &[404, 409, 410, 429];

/// Main error type for cluster reconciliation
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Validation error for a Cluster or one of its referenced objects
    #[error("validation error for {cluster}: {message}")]
    Validation {
        /// Name of the cluster with invalid configuration
        cluster: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.controlPlaneConfiguration.count")
        field: Option<String>,
    },

    /// A referenced object does not exist (yet)
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Namespace the object was looked up in
        namespace: String,
        /// Name of the missing object
        name: String,
    },

    /// The Cluster names a datacenter kind with no registered provider
    #[error("invalid data center type {kind}")]
    UnsupportedDatacenter {
        /// The datacenter kind tag from `spec.datacenterRef.kind`
        kind: String,
    },

    /// Manifest compilation failed
    #[error("manifest error for {cluster}: {message}")]
    Manifest {
        /// Name of the cluster being compiled
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "tracker")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without cluster context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            cluster: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with cluster context and field path
    pub fn validation_for_field(
        cluster: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            cluster: cluster.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error for a namespaced object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an unsupported datacenter error
    pub fn unsupported_datacenter(kind: impl Into<String>) -> Self {
        Self::UnsupportedDatacenter { kind: kind.into() }
    }

    /// Create a manifest compilation error
    pub fn manifest(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Manifest {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Configuration problems (validation, unknown datacenter kinds, manifest
    /// compilation, serialization) need a user fix and are not retried.
    /// Conflicts, throttling and missing objects resolve themselves on a later
    /// pass. Other API client errors (bad request, forbidden, invalid) do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    RETRYABLE_CLIENT_CODES.contains(&ae.code) || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::NotFound { .. } => true,
            Error::UnsupportedDatacenter { .. } => false,
            Error::Manifest { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}
