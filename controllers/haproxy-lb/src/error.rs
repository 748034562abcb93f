//! Controller-specific error types.

use dataplane_client::DataplaneError;
use haproxy_lb::SecretError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the HAProxy load balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Secret lifecycle error
    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    /// Dataplane API error
    #[error("Dataplane error: {0}")]
    Dataplane(#[from] DataplaneError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HAProxyLoadBalancer lacks a name or namespace
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}
