//! Kubernetes resource watcher.
//!
//! Drives `kube_runtime::Controller` over HAProxyLoadBalancer resources and
//! the secrets they own, so a deleted or edited secret re-triggers its owner.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, reconcile};
use crds::HAProxyLoadBalancer;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Requeue delay after a failed reconciliation
const ERROR_REQUEUE: Duration = Duration::from_secs(60);

fn error_policy(lb: Arc<HAProxyLoadBalancer>, error: &ControllerError, _ctx: Arc<Reconciler>) -> Action {
    error!(
        "Reconciliation error for HAProxyLoadBalancer {}/{}: {}",
        lb.metadata.namespace.as_deref().unwrap_or_default(),
        lb.metadata.name.as_deref().unwrap_or_default(),
        error
    );
    Action::requeue(ERROR_REQUEUE)
}

/// Watches HAProxyLoadBalancer resources and their secrets.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    load_balancer_api: Api<HAProxyLoadBalancer>,
    secret_api: Api<Secret>,
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(
        reconciler: Arc<Reconciler>,
        load_balancer_api: Api<HAProxyLoadBalancer>,
        secret_api: Api<Secret>,
    ) -> Self {
        Self {
            reconciler,
            load_balancer_api,
            secret_api,
        }
    }

    /// Runs the controller loop until its watch streams end.
    pub async fn watch_load_balancers(self) -> Result<(), ControllerError> {
        info!("Starting HAProxyLoadBalancer watcher");

        // Debounce batches bursts of events (our own status patches included)
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        Controller::new(self.load_balancer_api, watcher::Config::default())
            .owns(self.secret_api, watcher::Config::default())
            .with_config(controller_config)
            .shutdown_on_signal()
            .run(reconcile, error_policy, self.reconciler)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled HAProxyLoadBalancer {}", obj),
                    Err(e) => error!("Controller error for HAProxyLoadBalancer: {}", e),
                }
            })
            .await;

        info!("HAProxyLoadBalancer watcher stopped");
        Ok(())
    }
}
