//! Secret store seam
//!
//! The lifecycle manager only needs keyed create/get/delete of secrets. The
//! [`SecretStore`] trait abstracts that so tests can run against the
//! in-memory `MockSecretStore` while the controller uses the Kubernetes API.

use crate::error::StoreError;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

/// Keyed secret persistence
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch a secret; `StoreError::NotFound` if absent.
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, StoreError>;

    /// Create a secret in its metadata namespace; `StoreError::AlreadyExists`
    /// if one with the same key exists.
    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Delete a secret; `StoreError::NotFound` if absent.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// Secret store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    /// Create a store using the given Kubernetes client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        match self.api(namespace).get(name).await {
            Ok(secret) => Ok(secret),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = secret.metadata.namespace.as_deref().ok_or_else(|| {
            StoreError::Backend("secret has no namespace".to_string())
        })?;
        let name = secret.metadata.name.as_deref().unwrap_or_default();

        debug!("Creating secret {}/{}", namespace, name);
        match self.api(namespace).create(&PostParams::default(), secret).await {
            Ok(created) => Ok(created),
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(StoreError::AlreadyExists {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!("Deleting secret {}/{}", namespace, name);
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(StoreError::Kube(e)),
        }
    }
}
