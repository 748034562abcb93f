//! Test utilities for unit testing the reconciler

use crds::{CLUSTER_NAME_LABEL, HAProxyLoadBalancer, HAProxyLoadBalancerSpec, HAProxyLoadBalancerStatus};
use haproxy_lb::SecretManager;
use haproxy_lb::mock::MockSecretStore;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Helper to create test HAProxyLoadBalancer CRD
pub fn create_test_load_balancer(name: &str, namespace: &str, address: Option<&str>) -> HAProxyLoadBalancer {
    HAProxyLoadBalancer {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            labels: Some(BTreeMap::from([(
                CLUSTER_NAME_LABEL.to_string(),
                "workload".to_string(),
            )])),
            ..Default::default()
        },
        spec: HAProxyLoadBalancerSpec::default(),
        status: Some(HAProxyLoadBalancerStatus {
            ready: false,
            address: address.map(str::to_string),
        }),
    }
}

/// Helper to create a secret manager over a fresh mock store
pub fn create_test_manager() -> (SecretManager, MockSecretStore) {
    let store = MockSecretStore::new();
    (SecretManager::new(Arc::new(store.clone())), store)
}
