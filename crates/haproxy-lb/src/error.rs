//! Load balancer lifecycle errors

use dataplane_client::DataplaneError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while generating or signing certificates
#[derive(Debug, Error)]
pub enum PkiError {
    /// RSA key generation or encoding failed
    #[error("failed to generate RSA key: {0}")]
    KeyGeneration(String),

    /// The certificate could not be built or signed
    #[error("failed to create certificate: {0}")]
    CertificateGeneration(String),

    /// PEM input could not be parsed
    #[error("failed to parse {what}: {reason}")]
    Parse {
        /// What was being parsed
        what: &'static str,
        /// Parser message
        reason: String,
    },

    /// The address a client certificate is bound to is not an IP address
    #[error("invalid IP address {0:?}")]
    InvalidIpAddress(String),

    /// The validity window cannot be encoded in a certificate
    #[error("invalid certificate validity: {0}")]
    InvalidValidity(String),

    /// A certificate's signature does not verify against the CA
    #[error("certificate signature verification failed: {0}")]
    Verification(String),
}

/// Errors raised while rendering HAProxy or cloud-init documents
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to compile
    #[error("failed to register template {name}: {source}")]
    Template {
        /// Template name
        name: &'static str,
        /// Template compiler error
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    /// A template failed to render
    #[error("failed to render template {name}: {source}")]
    Render {
        /// Template name
        name: &'static str,
        /// Render error
        #[source]
        source: handlebars::RenderError,
    },

    /// Rendering requires a dataplane config and none was provided
    #[error("a dataplane config is required to render {0}")]
    MissingDataplaneConfig(&'static str),
}

/// Errors raised by a secret store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// No secret with this key exists
    #[error("secret {namespace}/{name} not found")]
    NotFound {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
    },

    /// A secret with this key already exists
    #[error("secret {namespace}/{name} already exists")]
    AlreadyExists {
        /// Secret namespace
        namespace: String,
        /// Secret name
        name: String,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Any other backend failure
    #[error("secret store error: {0}")]
    Backend(String),
}

/// Errors raised by the secret lifecycle manager
///
/// Every variant names the operation and the secret (or load balancer) it
/// was acting on as `namespace/name`.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The secret store rejected or failed the call
    #[error("failed to {operation} {secret}: {source}")]
    Store {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// Store error
        #[source]
        source: StoreError,
    },

    /// Certificate generation or signing failed
    #[error("failed to {operation} {secret}: {source}")]
    Pki {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// PKI error
        #[source]
        source: PkiError,
    },

    /// Bootstrap data could not be rendered
    #[error("failed to {operation} {secret}: {source}")]
    Render {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// Render error
        #[source]
        source: RenderError,
    },

    /// The dataplane config could not be serialized or loaded
    #[error("failed to {operation} {secret}: {source}")]
    Dataplane {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// Dataplane config error
        #[source]
        source: DataplaneError,
    },

    /// The load balancer has no address yet
    #[error("failed to {operation} for load balancer {load_balancer}: status.address is not set")]
    MissingAddress {
        /// Operation name
        operation: &'static str,
        /// Load balancer identity
        load_balancer: String,
    },

    /// A stored secret lacks a required data key
    #[error("secret {secret} is missing data key {key:?}")]
    MissingData {
        /// Secret identity
        secret: String,
        /// Missing key
        key: &'static str,
    },

    /// A store call did not finish within the operation timeout
    #[error("failed to {operation} {secret}: timed out after {timeout:?}")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// A blocking worker task panicked or was cancelled
    #[error("failed to {operation} {secret}: worker task failed: {reason}")]
    Task {
        /// Operation name
        operation: &'static str,
        /// Secret identity
        secret: String,
        /// Join error message
        reason: String,
    },

    /// The load balancer resource lacks name or namespace
    #[error("invalid load balancer resource: {0}")]
    InvalidResource(String),
}

impl SecretError {
    /// Whether the error is a not-found from the secret store.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SecretError::Store {
                source: StoreError::NotFound { .. },
                ..
            }
        )
    }

    /// Whether the error is an already-exists conflict from the secret store.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            SecretError::Store {
                source: StoreError::AlreadyExists { .. },
                ..
            }
        )
    }
}
