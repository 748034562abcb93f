//! Reconciliation logic for HAProxyLoadBalancer resources.
//!
//! Secrets are advanced one step at a time in dependency order: CA, then
//! bootstrap data, then (once the VM reports an address) the dataplane
//! config. A config that targets an old address is rotated.

use crate::error::ControllerError;
use crate::settings::Settings;
use crds::{HAPROXY_LOAD_BALANCER_FINALIZER, HAProxyLoadBalancer};
use dataplane_client::{DataplaneClient, DataplaneConfig};
use haproxy_lb::{SecretError, SecretManager, SecretState, dataplane_server_url};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};
use kube_runtime::controller::Action;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue delay after a load balancer became ready
const READY_RESYNC: Duration = Duration::from_secs(300);

/// Outcome of advancing a load balancer's secrets
#[derive(Debug)]
pub enum SecretProgress {
    /// CA and bootstrap secrets exist; the config secret waits for `status.address`
    AwaitingAddress,
    /// All secrets exist and the config targets the current address
    Complete(DataplaneConfig),
}

/// Reconciles HAProxyLoadBalancer resources.
pub struct Reconciler {
    pub(crate) kube_client: Client,
    pub(crate) manager: SecretManager,
    pub(crate) settings: Settings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("manager", &self.manager)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a new reconciler.
    pub fn new(kube_client: Client, manager: SecretManager, settings: Settings) -> Self {
        Self {
            kube_client,
            manager,
            settings,
        }
    }

    /// Reconcile a single HAProxyLoadBalancer.
    pub async fn reconcile_load_balancer(&self, lb: &HAProxyLoadBalancer) -> Result<Action, ControllerError> {
        let (namespace, name) = identity(lb)?;
        let api: Api<HAProxyLoadBalancer> = Api::namespaced(self.kube_client.clone(), namespace);

        if lb.is_being_deleted() {
            if lb.has_finalizer() {
                info!("Tearing down HAProxyLoadBalancer {}/{}", namespace, name);
                self.manager.delete_all_secrets(namespace, name).await?;
                remove_finalizer(&api, lb, name).await?;
            }
            return Ok(Action::await_change());
        }

        if !lb.has_finalizer() {
            add_finalizer(&api, lb, name).await?;
        }

        let config = match advance_secrets(&self.manager, lb).await? {
            SecretProgress::AwaitingAddress => {
                debug!(
                    "HAProxyLoadBalancer {}/{} has no address yet, requeueing in {:?}",
                    namespace, name, self.settings.address_requeue
                );
                self.update_ready(&api, lb, name, false).await?;
                return Ok(Action::requeue(self.settings.address_requeue));
            }
            SecretProgress::Complete(config) => config,
        };

        // Without the dataplane check, a complete set of secrets counts as ready
        let ready = !self.settings.dataplane_check_enabled || check_dataplane(&config).await;
        self.update_ready(&api, lb, name, ready).await?;
        if ready {
            Ok(Action::requeue(READY_RESYNC))
        } else {
            Ok(Action::requeue(self.settings.address_requeue))
        }
    }

    async fn update_ready(
        &self,
        api: &Api<HAProxyLoadBalancer>,
        lb: &HAProxyLoadBalancer,
        name: &str,
        ready: bool,
    ) -> Result<(), ControllerError> {
        if lb.status.as_ref().is_some_and(|s| s.ready == ready) {
            return Ok(());
        }

        let status_patch = json!({ "status": { "ready": ready } });
        let pp = PatchParams::default();
        api.patch_status(name, &pp, &Patch::Merge(&status_patch)).await?;
        info!("HAProxyLoadBalancer {} ready: {}", name, ready);
        Ok(())
    }
}

/// Create whichever secrets are missing, in dependency order.
///
/// Bootstrap and config secrets are derived from the CA secret, so both are
/// rotated whenever the CA is (re)created or the config no longer carries the
/// stored CA and credentials. A config whose server no longer matches
/// `status.address` is rotated on its own.
pub async fn advance_secrets(
    manager: &SecretManager,
    lb: &HAProxyLoadBalancer,
) -> Result<SecretProgress, ControllerError> {
    let (namespace, name) = identity(lb)?;
    let mut state = manager.secret_state(namespace, name).await?;
    debug!("HAProxyLoadBalancer {}/{} secret state: {:?}", namespace, name, state);

    if state < SecretState::CaReady && created(manager.create_ca_secret(lb).await)? {
        // Leftovers were derived from a previous CA
        info!(
            "New CA for {}/{}, dropping bootstrap and config secrets derived from the old one",
            namespace, name
        );
        manager.delete_bootstrap_secret(namespace, name).await?;
        manager.delete_config_secret(namespace, name).await?;
        state = SecretState::CaReady;
    }
    if state < SecretState::BootstrapReady {
        created(manager.create_bootstrap_secret(lb).await)?;
    }

    let Some(address) = lb.address() else {
        return Ok(SecretProgress::AwaitingAddress);
    };

    if state < SecretState::ConfigReady {
        created(manager.create_config_secret(lb).await)?;
    }

    let config = manager.get_dataplane_config(namespace, name).await?;
    let expected = dataplane_server_url(address);
    if !manager.config_matches_ca(namespace, name, &config).await? {
        info!(
            "Dataplane config for {}/{} does not match its CA secret, rotating bootstrap and config",
            namespace, name
        );
        manager.delete_bootstrap_secret(namespace, name).await?;
        manager.create_bootstrap_secret(lb).await?;
    } else if config.server != expected {
        info!(
            "Rotating dataplane config for {}/{}: server {} -> {}",
            namespace, name, config.server, expected
        );
    } else {
        return Ok(SecretProgress::Complete(config));
    }

    manager.delete_config_secret(namespace, name).await?;
    manager.create_config_secret(lb).await?;
    Ok(SecretProgress::Complete(
        manager.get_dataplane_config(namespace, name).await?,
    ))
}

/// Check that the dataplane API answers with the stored credentials.
pub async fn check_dataplane(config: &DataplaneConfig) -> bool {
    let client = match DataplaneClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Invalid dataplane config for {}: {}", config.server, e);
            return false;
        }
    };

    match client.info().await {
        Ok(info) => {
            debug!("Dataplane API {} at {}", info.api.version, client.base_url());
            true
        }
        Err(e) => {
            warn!("Dataplane API at {} not reachable: {}", client.base_url(), e);
            false
        }
    }
}

/// `Ok(true)` if the secret was created, `Ok(false)` if it already existed.
fn created<T>(result: Result<T, SecretError>) -> Result<bool, SecretError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_already_exists() => {
            debug!("{}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

async fn add_finalizer(
    api: &Api<HAProxyLoadBalancer>,
    lb: &HAProxyLoadBalancer,
    name: &str,
) -> Result<(), ControllerError> {
    let mut finalizers = lb.metadata.finalizers.clone().unwrap_or_default();
    finalizers.push(HAPROXY_LOAD_BALANCER_FINALIZER.to_string());
    patch_finalizers(api, name, finalizers).await?;
    debug!("Added finalizer to HAProxyLoadBalancer {}", name);
    Ok(())
}

async fn remove_finalizer(
    api: &Api<HAProxyLoadBalancer>,
    lb: &HAProxyLoadBalancer,
    name: &str,
) -> Result<(), ControllerError> {
    let finalizers: Vec<String> = lb
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|f| f.as_str() != HAPROXY_LOAD_BALANCER_FINALIZER)
        .cloned()
        .collect();
    match patch_finalizers(api, name, finalizers).await {
        Ok(()) => {}
        Err(kube::Error::Api(ae)) if ae.code == 404 => {}
        Err(e) => return Err(e.into()),
    }
    debug!("Removed finalizer from HAProxyLoadBalancer {}", name);
    Ok(())
}

async fn patch_finalizers(
    api: &Api<HAProxyLoadBalancer>,
    name: &str,
    finalizers: Vec<String>,
) -> Result<(), kube::Error> {
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

fn identity(lb: &HAProxyLoadBalancer) -> Result<(&str, &str), ControllerError> {
    let name = lb
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidResource("HAProxyLoadBalancer has no name".to_string()))?;
    let namespace = lb
        .metadata
        .namespace
        .as_deref()
        .ok_or_else(|| ControllerError::InvalidResource(format!("HAProxyLoadBalancer {name} has no namespace")))?;
    Ok((namespace, name))
}

/// kube-runtime reconcile entry point.
pub async fn reconcile(lb: Arc<HAProxyLoadBalancer>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    ctx.reconcile_load_balancer(&lb).await
}
