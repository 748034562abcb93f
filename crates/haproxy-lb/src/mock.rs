//! In-memory SecretStore for unit testing
//!
//! Behaves like the API server for the calls the lifecycle manager makes:
//! creates conflict on existing keys, lookups and deletes of missing keys
//! return not-found.

use crate::error::StoreError;
use crate::store::SecretStore;
use k8s_openapi::api::core::v1::Secret;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type SecretKey = (String, String);

/// Mock secret store for testing
#[derive(Clone, Debug, Default)]
pub struct MockSecretStore {
    secrets: Arc<Mutex<HashMap<SecretKey, Secret>>>,
}

impl MockSecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn secrets(&self) -> MutexGuard<'_, HashMap<SecretKey, Secret>> {
        self.secrets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a secret without any conflict checks
    pub fn insert(&self, secret: Secret) {
        let key = key_of(&secret);
        self.secrets().insert(key, secret);
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.secrets().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.secrets().is_empty()
    }

    /// Whether a secret exists
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.secrets()
            .contains_key(&(namespace.to_string(), name.to_string()))
    }

    /// Sorted names of the secrets in a namespace
    pub fn names_in(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .secrets()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }
}

fn key_of(secret: &Secret) -> SecretKey {
    (
        secret.metadata.namespace.clone().unwrap_or_default(),
        secret.metadata.name.clone().unwrap_or_default(),
    )
}

#[async_trait::async_trait]
impl SecretStore for MockSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Secret, StoreError> {
        self.secrets()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = key_of(secret);
        let mut secrets = self.secrets();
        if secrets.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: key.0,
                name: key.1,
            });
        }
        secrets.insert(key, secret.clone());
        Ok(secret.clone())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.secrets()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
