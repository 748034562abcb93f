//! Secret lifecycle for HAProxy load balancers
//!
//! Each load balancer owns three secrets, named after it:
//!
//! | Secret | Data keys |
//! |---|---|
//! | `<name>-haproxy-ca` | `ca.cert`, `ca.key`, `username`, `password` |
//! | `<name>-haproxy-bootstrap` | `value` (cloud-init user data) |
//! | `<name>-haproxy-config` | `value` (dataplane config YAML) |
//!
//! They are created in that order, never updated in place, and deleted
//! independently. Each create does all of its CPU work before the single
//! store call, so a dropped future never leaves a partial secret behind.

use crate::error::{PkiError, SecretError, StoreError};
use crate::pki::{CertificateValidity, generate_ca, sign_client_certificate};
use crate::render::RenderConfiguration;
use crate::store::SecretStore;
use crds::{CLUSTER_NAME_LABEL, HAProxyLoadBalancer};
use dataplane_client::{DataplaneConfig, load_dataplane_config};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Suffix of the CA secret name
pub const SECRET_SUFFIX_CA: &str = "-haproxy-ca";

/// Suffix of the bootstrap data secret name
pub const SECRET_SUFFIX_BOOTSTRAP: &str = "-haproxy-bootstrap";

/// Suffix of the dataplane config secret name
pub const SECRET_SUFFIX_CONFIG: &str = "-haproxy-config";

/// CA certificate key in the CA secret
pub const SECRET_DATA_KEY_CA_CERT: &str = "ca.cert";

/// CA private key key in the CA secret
pub const SECRET_DATA_KEY_CA_KEY: &str = "ca.key";

/// Dataplane API username key in the CA secret
pub const SECRET_DATA_KEY_USERNAME: &str = "username";

/// Dataplane API password key in the CA secret
pub const SECRET_DATA_KEY_PASSWORD: &str = "password";

/// Payload key of the bootstrap and config secrets
pub const SECRET_DATA_KEY_VALUE: &str = "value";

/// Port of the dataplane API on the load balancer VM
pub const DATAPLANE_API_PORT: u16 = 5556;

/// Name of a load balancer's CA secret
pub fn name_for_ca_secret(load_balancer_name: &str) -> String {
    format!("{load_balancer_name}{SECRET_SUFFIX_CA}")
}

/// Name of a load balancer's bootstrap data secret
pub fn name_for_bootstrap_secret(load_balancer_name: &str) -> String {
    format!("{load_balancer_name}{SECRET_SUFFIX_BOOTSTRAP}")
}

/// Name of a load balancer's dataplane config secret
pub fn name_for_config_secret(load_balancer_name: &str) -> String {
    format!("{load_balancer_name}{SECRET_SUFFIX_CONFIG}")
}

/// Dataplane API URL for a load balancer address
pub fn dataplane_server_url(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("https://[{ip}]:{DATAPLANE_API_PORT}/v1"),
        _ => format!("https://{address}:{DATAPLANE_API_PORT}/v1"),
    }
}

/// How far a load balancer's secrets have progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecretState {
    /// No CA secret yet
    NoSecrets,
    /// CA secret exists
    CaReady,
    /// CA and bootstrap secrets exist
    BootstrapReady,
    /// All three secrets exist
    ConfigReady,
}

/// Creates, reads and deletes a load balancer's secrets through a [`SecretStore`]
#[derive(Clone)]
pub struct SecretManager {
    store: Arc<dyn SecretStore>,
    operation_timeout: Option<Duration>,
}

impl std::fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretManager")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

impl SecretManager {
    /// Create a manager over the given store
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            operation_timeout: None,
        }
    }

    /// Bound every store call by `timeout`
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Create the CA secret: a fresh self-signed CA plus random dataplane API
    /// credentials.
    pub async fn create_ca_secret(&self, load_balancer: &HAProxyLoadBalancer) -> Result<Secret, SecretError> {
        const OPERATION: &str = "create CA secret";
        let (namespace, name) = identity(load_balancer)?;
        let secret_name = name_for_ca_secret(name);
        let id = format!("{namespace}/{secret_name}");

        let validity = CertificateValidity::with_default_skew();
        let ca = self
            .blocking(OPERATION, &id, move || generate_ca(validity.not_before, validity.not_after))
            .await?;

        let data = BTreeMap::from([
            (SECRET_DATA_KEY_CA_CERT.to_string(), ByteString(ca.certificate_pem.into_bytes())),
            (SECRET_DATA_KEY_CA_KEY.to_string(), ByteString(ca.private_key_pem.into_bytes())),
            (
                SECRET_DATA_KEY_USERNAME.to_string(),
                ByteString(uuid::Uuid::new_v4().to_string().into_bytes()),
            ),
            (
                SECRET_DATA_KEY_PASSWORD.to_string(),
                ByteString(uuid::Uuid::new_v4().to_string().into_bytes()),
            ),
        ]);
        let secret = new_secret(load_balancer, namespace, &secret_name, data);

        let created = self.store_call(OPERATION, &id, self.store.create(&secret)).await?;
        info!("Created CA secret {}", id);
        Ok(created)
    }

    /// Create the bootstrap secret from the CA secret.
    ///
    /// Fails with a not-found error if the CA secret does not exist. No client
    /// certificate is signed here; the VM mints its own server certificate
    /// from the CA it receives.
    pub async fn create_bootstrap_secret(
        &self,
        load_balancer: &HAProxyLoadBalancer,
    ) -> Result<Secret, SecretError> {
        const OPERATION: &str = "create bootstrap secret";
        let (namespace, name) = identity(load_balancer)?;
        let secret_name = name_for_bootstrap_secret(name);
        let id = format!("{namespace}/{secret_name}");

        let ca = self.get_ca_material(namespace, name).await?;
        let bootstrap_data = RenderConfiguration::new()
            .with_bootstrap_info(
                load_balancer,
                &ca.username,
                &ca.password,
                ca.certificate_pem.as_bytes(),
                ca.private_key_pem.as_bytes(),
            )
            .render_bootstrap_data()
            .map_err(|source| SecretError::Render {
                operation: OPERATION,
                secret: id.clone(),
                source,
            })?;

        let data = BTreeMap::from([(SECRET_DATA_KEY_VALUE.to_string(), ByteString(bootstrap_data))]);
        let secret = new_secret(load_balancer, namespace, &secret_name, data);

        let created = self.store_call(OPERATION, &id, self.store.create(&secret)).await?;
        info!("Created bootstrap secret {}", id);
        Ok(created)
    }

    /// Create the dataplane config secret with a client certificate bound to
    /// the load balancer's address.
    ///
    /// Fails with a not-found error if the CA secret does not exist and with
    /// [`SecretError::MissingAddress`] if `status.address` is not set.
    pub async fn create_config_secret(
        &self,
        load_balancer: &HAProxyLoadBalancer,
    ) -> Result<Secret, SecretError> {
        const OPERATION: &str = "create config secret";
        let (namespace, name) = identity(load_balancer)?;
        let secret_name = name_for_config_secret(name);
        let id = format!("{namespace}/{secret_name}");

        let ca = self.get_ca_material(namespace, name).await?;
        let address = load_balancer
            .address()
            .ok_or_else(|| SecretError::MissingAddress {
                operation: OPERATION,
                load_balancer: format!("{namespace}/{name}"),
            })?
            .to_string();

        let validity = CertificateValidity::with_default_skew();
        let (ca_cert, ca_key, ip) = (
            ca.certificate_pem.clone(),
            ca.private_key_pem.clone(),
            address.clone(),
        );
        let client = self
            .blocking(OPERATION, &id, move || {
                sign_client_certificate(&ca_cert, &ca_key, validity.not_before, validity.not_after, &ip)
            })
            .await?;

        let config = DataplaneConfig {
            server: dataplane_server_url(&address),
            username: ca.username,
            password: ca.password,
            certificate_authority_data: ca.certificate_pem.into_bytes(),
            client_certificate_data: client.certificate_pem.into_bytes(),
            client_key_data: client.private_key_pem.into_bytes(),
            ..Default::default()
        };
        let config_yaml = config.to_yaml().map_err(|source| SecretError::Dataplane {
            operation: OPERATION,
            secret: id.clone(),
            source,
        })?;

        let data = BTreeMap::from([(
            SECRET_DATA_KEY_VALUE.to_string(),
            ByteString(config_yaml.into_bytes()),
        )]);
        let secret = new_secret(load_balancer, namespace, &secret_name, data);

        let created = self.store_call(OPERATION, &id, self.store.create(&secret)).await?;
        info!("Created config secret {} for server {}", id, config.server);
        Ok(created)
    }

    /// Fetch the CA secret of a load balancer.
    pub async fn get_ca_secret(&self, namespace: &str, load_balancer_name: &str) -> Result<Secret, SecretError> {
        self.get_secret("get CA secret", namespace, &name_for_ca_secret(load_balancer_name))
            .await
    }

    /// Fetch the bootstrap secret of a load balancer.
    pub async fn get_bootstrap_secret(
        &self,
        namespace: &str,
        load_balancer_name: &str,
    ) -> Result<Secret, SecretError> {
        self.get_secret(
            "get bootstrap secret",
            namespace,
            &name_for_bootstrap_secret(load_balancer_name),
        )
        .await
    }

    /// Fetch the dataplane config secret of a load balancer.
    pub async fn get_config_secret(
        &self,
        namespace: &str,
        load_balancer_name: &str,
    ) -> Result<Secret, SecretError> {
        self.get_secret("get config secret", namespace, &name_for_config_secret(load_balancer_name))
            .await
    }

    /// Delete the CA secret. Succeeds if it is already gone.
    pub async fn delete_ca_secret(&self, namespace: &str, load_balancer_name: &str) -> Result<(), SecretError> {
        self.delete_secret("delete CA secret", namespace, &name_for_ca_secret(load_balancer_name))
            .await
    }

    /// Delete the bootstrap secret. Succeeds if it is already gone.
    pub async fn delete_bootstrap_secret(
        &self,
        namespace: &str,
        load_balancer_name: &str,
    ) -> Result<(), SecretError> {
        self.delete_secret(
            "delete bootstrap secret",
            namespace,
            &name_for_bootstrap_secret(load_balancer_name),
        )
        .await
    }

    /// Delete the dataplane config secret. Succeeds if it is already gone.
    pub async fn delete_config_secret(
        &self,
        namespace: &str,
        load_balancer_name: &str,
    ) -> Result<(), SecretError> {
        self.delete_secret(
            "delete config secret",
            namespace,
            &name_for_config_secret(load_balancer_name),
        )
        .await
    }

    /// Delete all three secrets of a load balancer.
    ///
    /// Every deletion is attempted; the first failure is returned.
    pub async fn delete_all_secrets(&self, namespace: &str, load_balancer_name: &str) -> Result<(), SecretError> {
        let results = [
            self.delete_config_secret(namespace, load_balancer_name).await,
            self.delete_bootstrap_secret(namespace, load_balancer_name).await,
            self.delete_ca_secret(namespace, load_balancer_name).await,
        ];
        results.into_iter().collect::<Result<Vec<()>, _>>()?;

        info!("Deleted HAProxy secrets for load balancer {}/{}", namespace, load_balancer_name);
        Ok(())
    }

    /// Load the dataplane config stored in the config secret.
    pub async fn get_dataplane_config(
        &self,
        namespace: &str,
        load_balancer_name: &str,
    ) -> Result<DataplaneConfig, SecretError> {
        let secret = self.get_config_secret(namespace, load_balancer_name).await?;
        let id = format!("{namespace}/{}", name_for_config_secret(load_balancer_name));
        let value = secret_data(&secret, &id, SECRET_DATA_KEY_VALUE)?;

        load_dataplane_config(value).map_err(|source| SecretError::Dataplane {
            operation: "load dataplane config from",
            secret: id,
            source,
        })
    }

    /// Check that `config` was issued from the CA secret as it is stored now.
    ///
    /// A config whose CA certificate or credentials differ from the CA secret
    /// was derived from a CA that has since been replaced.
    pub async fn config_matches_ca(
        &self,
        namespace: &str,
        load_balancer_name: &str,
        config: &DataplaneConfig,
    ) -> Result<bool, SecretError> {
        let ca = self.get_ca_material(namespace, load_balancer_name).await?;
        Ok(config.certificate_authority_data.as_slice() == ca.certificate_pem.as_bytes()
            && config.username == ca.username
            && config.password == ca.password)
    }

    /// Report which secrets of a load balancer exist.
    pub async fn secret_state(&self, namespace: &str, load_balancer_name: &str) -> Result<SecretState, SecretError> {
        if !exists(self.get_ca_secret(namespace, load_balancer_name).await)? {
            return Ok(SecretState::NoSecrets);
        }
        if !exists(self.get_bootstrap_secret(namespace, load_balancer_name).await)? {
            return Ok(SecretState::CaReady);
        }
        if !exists(self.get_config_secret(namespace, load_balancer_name).await)? {
            return Ok(SecretState::BootstrapReady);
        }
        Ok(SecretState::ConfigReady)
    }

    async fn get_secret(&self, operation: &'static str, namespace: &str, secret_name: &str) -> Result<Secret, SecretError> {
        let id = format!("{namespace}/{secret_name}");
        self.store_call(operation, &id, self.store.get(namespace, secret_name))
            .await
    }

    async fn delete_secret(&self, operation: &'static str, namespace: &str, secret_name: &str) -> Result<(), SecretError> {
        let id = format!("{namespace}/{secret_name}");

        let secret = match self.store_call(operation, &id, self.store.get(namespace, secret_name)).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                debug!("Secret {} already deleted", id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if secret.metadata.deletion_timestamp.is_some() {
            debug!("Secret {} is already being deleted", id);
            return Ok(());
        }

        match self.store_call(operation, &id, self.store.delete(namespace, secret_name)).await {
            Ok(()) => {
                info!("Deleted secret {}", id);
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_ca_material(&self, namespace: &str, load_balancer_name: &str) -> Result<CaMaterial, SecretError> {
        let secret = self.get_ca_secret(namespace, load_balancer_name).await?;
        let id = format!("{namespace}/{}", name_for_ca_secret(load_balancer_name));
        let text = |key: &'static str| -> Result<String, SecretError> {
            Ok(String::from_utf8_lossy(secret_data(&secret, &id, key)?).into_owned())
        };

        Ok(CaMaterial {
            certificate_pem: text(SECRET_DATA_KEY_CA_CERT)?,
            private_key_pem: text(SECRET_DATA_KEY_CA_KEY)?,
            username: text(SECRET_DATA_KEY_USERNAME)?,
            password: text(SECRET_DATA_KEY_PASSWORD)?,
        })
    }

    async fn store_call<T>(
        &self,
        operation: &'static str,
        secret: &str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, SecretError> {
        let result = match self.operation_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call).await.map_err(|_| SecretError::Timeout {
                operation,
                secret: secret.to_string(),
                timeout,
            })?,
            None => call.await,
        };
        result.map_err(|source| SecretError::Store {
            operation,
            secret: secret.to_string(),
            source,
        })
    }

    async fn blocking<T: Send + 'static>(
        &self,
        operation: &'static str,
        secret: &str,
        work: impl FnOnce() -> Result<T, PkiError> + Send + 'static,
    ) -> Result<T, SecretError> {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| SecretError::Task {
                operation,
                secret: secret.to_string(),
                reason: e.to_string(),
            })?
            .map_err(|source| SecretError::Pki {
                operation,
                secret: secret.to_string(),
                source,
            })
    }
}

struct CaMaterial {
    certificate_pem: String,
    private_key_pem: String,
    username: String,
    password: String,
}

fn identity(load_balancer: &HAProxyLoadBalancer) -> Result<(&str, &str), SecretError> {
    let name = load_balancer
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| SecretError::InvalidResource("HAProxyLoadBalancer has no name".to_string()))?;
    let namespace = load_balancer.metadata.namespace.as_deref().ok_or_else(|| {
        SecretError::InvalidResource(format!("HAProxyLoadBalancer {name} has no namespace"))
    })?;
    Ok((namespace, name))
}

fn new_secret(
    load_balancer: &HAProxyLoadBalancer,
    namespace: &str,
    secret_name: &str,
    data: BTreeMap<String, ByteString>,
) -> Secret {
    let labels = load_balancer
        .cluster_name()
        .map(|cluster| BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster.to_string())]));

    Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels,
            owner_references: load_balancer.controller_owner_ref(&()).map(|owner| vec![owner]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

fn secret_data<'a>(secret: &'a Secret, id: &str, key: &'static str) -> Result<&'a [u8], SecretError> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| value.0.as_slice())
        .ok_or_else(|| SecretError::MissingData {
            secret: id.to_string(),
            key,
        })
}

fn exists(result: Result<Secret, SecretError>) -> Result<bool, SecretError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => Ok(false),
        Err(e) => Err(e),
    }
}
