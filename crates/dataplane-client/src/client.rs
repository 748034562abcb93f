//! HAProxy dataplane API client
//!
//! Builds a mutual-TLS `reqwest` client from a [`DataplaneConfig`] and wraps
//! the handful of dataplane API calls the controller needs.

use crate::config::DataplaneConfig;
use crate::error::DataplaneError;
use crate::models::{Info, RawConfiguration, Server, Versioned};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HOST, HeaderMap, HeaderValue};
use reqwest::{Certificate, Client, Identity, Response, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;
use x509_parser::pem::Pem;

/// User agent sent with every dataplane API request
pub const USER_AGENT: &str = "HAProxy Load Balancer Client";

/// HAProxy dataplane API client
#[derive(Debug, Clone)]
pub struct DataplaneClient {
    client: Client,
    base_url: String,
    debug: bool,
}

impl DataplaneClient {
    /// Create a client from a dataplane config
    ///
    /// The client presents `clientCertificateData`/`clientKeyData` as its TLS
    /// identity and sends basic auth credentials on every request. When
    /// `certificateAuthorityData` is set it becomes the only trusted root.
    ///
    /// When `serverName` is set, requests are addressed to that name so it is
    /// used for SNI and certificate verification, while connections still go
    /// to the host from `server`. The `Host` header keeps naming the `server`
    /// authority. An IP-literal `serverName` replaces the host outright.
    pub fn from_config(config: &DataplaneConfig) -> Result<Self, DataplaneError> {
        let timeout = config.effective_timeout()?;
        let mut base_url = Url::parse(&config.server).map_err(|e| DataplaneError::InvalidServerUrl {
            server: config.server.clone(),
            reason: e.to_string(),
        })?;

        let mut headers = basic_auth_headers(config)?;
        if !config.server_name.is_empty() {
            headers.insert(HOST, HeaderValue::try_from(authority(&base_url, &config.server)?)?);
        }

        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .default_headers(headers)
            .identity(client_identity(config)?);

        if !config.certificate_authority_data.is_empty() {
            builder = builder.tls_built_in_root_certs(false);
            for certificate in certificate_authorities(&config.certificate_authority_data)? {
                builder = builder.add_root_certificate(certificate);
            }
        }

        if config.insecure_skip_tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if !config.server_name.is_empty() {
            let target_host = base_url
                .host_str()
                .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
                .ok_or_else(|| DataplaneError::InvalidServerUrl {
                    server: config.server.clone(),
                    reason: "missing host".to_string(),
                })?;
            base_url
                .set_host(Some(&config.server_name))
                .map_err(|e| DataplaneError::InvalidServerUrl {
                    server: config.server.clone(),
                    reason: format!("invalid server name {:?}: {}", config.server_name, e),
                })?;
            debug!(
                "Dataplane requests for {} will connect to {}",
                config.server_name, target_host
            );
            builder = builder.dns_resolver(Arc::new(ServerNameResolver {
                server_name: config.server_name.to_ascii_lowercase(),
                target_host,
            }));
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            debug: config.debug,
        })
    }

    /// Get the base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch dataplane API and host information (`GET /info`)
    pub async fn info(&self) -> Result<Info, DataplaneError> {
        self.get_json("/info", &[]).await
    }

    /// Fetch the current configuration version
    pub async fn configuration_version(&self) -> Result<i64, DataplaneError> {
        self.get_json("/services/haproxy/configuration/version", &[])
            .await
    }

    /// Fetch the running haproxy.cfg together with its version
    pub async fn raw_configuration(&self) -> Result<RawConfiguration, DataplaneError> {
        self.get_json("/services/haproxy/configuration/raw", &[])
            .await
    }

    /// Replace the running haproxy.cfg
    ///
    /// `version` must match the current configuration version or the API
    /// rejects the push with a conflict.
    pub async fn push_raw_configuration(
        &self,
        configuration: &str,
        version: i64,
    ) -> Result<(), DataplaneError> {
        let url = self.url("/services/haproxy/configuration/raw");
        if self.debug {
            debug!("POST {} (version {})", url, version);
        }

        let response = self
            .client
            .post(&url)
            .query(&[("version", version)])
            .header(CONTENT_TYPE, "text/plain")
            .body(configuration.to_string())
            .send()
            .await?;
        error_for_status(response).await?;

        debug!("Pushed raw HAProxy configuration at version {}", version);
        Ok(())
    }

    /// List the servers of a backend
    pub async fn backend_servers(&self, backend: &str) -> Result<Vec<Server>, DataplaneError> {
        let servers: Versioned<Vec<Server>> = self
            .get_json("/services/haproxy/configuration/servers", &[("backend", backend)])
            .await?;
        Ok(servers.data)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DataplaneError> {
        let url = self.url(path);
        if self.debug {
            debug!("GET {}", url);
        }

        let response = self
            .client
            .get(&url)
            .query(query)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let body = error_for_status(response).await?.text().await?;

        if self.debug {
            debug!("Response from {}: {}", url, body);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

async fn error_for_status(response: Response) -> Result<Response, DataplaneError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DataplaneError::Api {
        status: status.as_u16(),
        body,
    })
}

fn basic_auth_headers(config: &DataplaneConfig) -> Result<HeaderMap, DataplaneError> {
    let credentials = STANDARD.encode(format!(
        "{}:{}",
        config.effective_username(),
        config.effective_password()
    ));
    let mut value = HeaderValue::try_from(format!("Basic {credentials}"))?;
    value.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

/// `host[:port]` of `url` as it appears in the URL.
fn authority(url: &Url, server: &str) -> Result<String, DataplaneError> {
    let host = url.host_str().ok_or_else(|| DataplaneError::InvalidServerUrl {
        server: server.to_string(),
        reason: "missing host".to_string(),
    })?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn client_identity(config: &DataplaneConfig) -> Result<Identity, DataplaneError> {
    if config.client_certificate_data.is_empty() || config.client_key_data.is_empty() {
        return Err(DataplaneError::InvalidClientCertificate(
            "client certificate and key are required".to_string(),
        ));
    }

    let mut pem = config.client_certificate_data.clone();
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    pem.extend_from_slice(&config.client_key_data);

    Identity::from_pem(&pem).map_err(|e| DataplaneError::InvalidClientCertificate(e.to_string()))
}

fn certificate_authorities(data: &[u8]) -> Result<Vec<Certificate>, DataplaneError> {
    let mut certificates = Vec::new();
    for pem in Pem::iter_from_buffer(data) {
        let pem = pem.map_err(|e| DataplaneError::InvalidCertificateAuthority(e.to_string()))?;
        if pem.label != "CERTIFICATE" {
            continue;
        }
        pem.parse_x509()
            .map_err(|e| DataplaneError::InvalidCertificateAuthority(e.to_string()))?;
        certificates.push(Certificate::from_der(&pem.contents)?);
    }

    if certificates.is_empty() {
        return Err(DataplaneError::InvalidCertificateAuthority(
            "no PEM certificates found".to_string(),
        ));
    }
    Ok(certificates)
}

/// Resolves the configured server name to the host from the server URL and
/// everything else normally.
#[derive(Debug)]
struct ServerNameResolver {
    server_name: String,
    target_host: String,
}

impl Resolve for ServerNameResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let host = if name.as_str().eq_ignore_ascii_case(&self.server_name) {
            self.target_host.clone()
        } else {
            name.as_str().to_string()
        };
        Box::pin(async move {
            // Ports come from the request URL
            let addrs: Vec<_> = tokio::net::lookup_host((host.as_str(), 0)).await?.collect();
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok(addrs)
        })
    }
}
