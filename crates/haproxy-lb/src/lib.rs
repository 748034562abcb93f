//! HAProxy load balancer lifecycle
//!
//! Everything a controller needs to stand up a self-hosted HAProxy load
//! balancer in front of a Kubernetes API server:
//!
//! - [`pki`]: the per-load-balancer signing CA and dataplane client certificates
//! - [`render`]: `haproxy.cfg` and the cloud-init bootstrap document
//! - [`secrets`]: creation and teardown of the three derived secrets
//! - [`store`]: the secret persistence seam and its Kubernetes implementation

pub mod error;
pub mod pki;
pub mod render;
pub mod secrets;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

#[cfg(test)]
mod test_utils;


pub use error::{PkiError, RenderError, SecretError, StoreError};
pub use pki::{CertificateValidity, ClientKeyPair, PemKeyPair, SigningKeyPair};
pub use render::{BackendAddress, RenderConfiguration};
pub use secrets::{
    SecretManager, SecretState, dataplane_server_url, name_for_bootstrap_secret,
    name_for_ca_secret, name_for_config_secret,
};
pub use store::{KubeSecretStore, SecretStore};
