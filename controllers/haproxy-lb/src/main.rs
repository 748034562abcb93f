//! HAProxy Load Balancer Controller
//!
//! Reconciles `HAProxyLoadBalancer` resources into the secrets a load
//! balancer VM needs:
//! - `<name>-haproxy-ca`: signing CA and dataplane API credentials
//! - `<name>-haproxy-bootstrap`: cloud-init user data for the VM
//! - `<name>-haproxy-config`: mTLS client config for the dataplane API
//!
//! Once all three exist the controller checks the dataplane API and reports
//! the result in `status.ready`.

mod controller;
mod error;
mod reconciler;
mod settings;
mod watcher;

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod reconciler_test;

use crate::error::ControllerError;
use crate::settings::Settings;
use controller::Controller;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();

    // kube and reqwest share one rustls provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting HAProxy Load Balancer Controller");

    let settings = Settings::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", settings.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Secret operation timeout: {:?}", settings.secret_operation_timeout);
    info!("  Address requeue: {:?}", settings.address_requeue);
    info!("  Dataplane check: {}", settings.dataplane_check_enabled);

    let controller = Controller::new(settings).await?;
    controller.run().await?;

    Ok(())
}
