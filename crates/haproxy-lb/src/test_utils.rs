//! Test utilities for the lifecycle manager

use crate::mock::MockSecretStore;
use crate::secrets::SecretManager;
use crds::{CLUSTER_NAME_LABEL, HAProxyLoadBalancer, HAProxyLoadBalancerSpec, HAProxyLoadBalancerStatus, SSHUser};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Helper to create a test HAProxyLoadBalancer with an optional address
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
        spec: HAProxyLoadBalancerSpec {
            virtual_machine_configuration: None,
            user: Some(SSHUser {
                name: "capv".to_string(),
                authorized_keys: vec!["ssh-rsa AAAAB3NzaC1yc2E capv@example".to_string()],
            }),
        },
        status: address.map(|a| HAProxyLoadBalancerStatus {
            ready: false,
            address: Some(a.to_string()),
        }),
    }
}

/// Helper to create a manager over a fresh mock store
pub fn create_test_manager() -> (SecretManager, MockSecretStore) {
    let store = MockSecretStore::new();
    (SecretManager::new(Arc::new(store.clone())), store)
}
