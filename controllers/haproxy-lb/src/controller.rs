//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the secret lifecycle manager and the watcher together.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::settings::Settings;
use crate::watcher::Watcher;
use crds::HAProxyLoadBalancer;
use haproxy_lb::{KubeSecretStore, SecretManager};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for HAProxy load balancers.
pub struct Controller {
    load_balancer_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its watcher.
    pub async fn new(settings: Settings) -> Result<Self, ControllerError> {
        info!("Initializing HAProxy load balancer controller");

        let kube_client = Client::try_default().await?;

        let (load_balancer_api, secret_api): (Api<HAProxyLoadBalancer>, Api<Secret>) =
            match settings.namespace.as_deref() {
                Some(ns) => (
                    Api::namespaced(kube_client.clone(), ns),
                    Api::namespaced(kube_client.clone(), ns),
                ),
                None => (Api::all(kube_client.clone()), Api::all(kube_client.clone())),
            };

        let store = Arc::new(KubeSecretStore::new(kube_client.clone()));
        let manager = SecretManager::new(store).with_operation_timeout(settings.secret_operation_timeout);
        let reconciler = Arc::new(Reconciler::new(kube_client, manager, settings));

        let watcher = Watcher::new(reconciler, load_balancer_api, secret_api);
        let load_balancer_watcher = tokio::spawn(watcher.watch_load_balancers());

        Ok(Self { load_balancer_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("HAProxy load balancer controller running");

        self.load_balancer_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("HAProxyLoadBalancer watcher panicked: {e}")))?
    }
}
