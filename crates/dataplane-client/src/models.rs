//! Dataplane API response models

use serde::{Deserialize, Serialize};

/// Response of `GET /info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// Dataplane API build information
    #[serde(default)]
    pub api: ApiInfo,

    /// Host system information, passed through untouched
    #[serde(default)]
    pub system: serde_json::Value,
}

/// Dataplane API build information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    /// Dataplane API version, e.g. `v2.1.0 e7f7fc1a`
    #[serde(default)]
    pub version: String,

    /// Build timestamp as reported by the API
    #[serde(default)]
    pub build_date: String,
}

/// Response of `GET /services/haproxy/configuration/raw`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConfiguration {
    /// Configuration version the data was read at
    #[serde(rename = "_version", default)]
    pub version: i64,

    /// Full haproxy.cfg contents
    #[serde(default)]
    pub data: String,
}

/// A server entry of a backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    /// Server name, unique within its backend
    pub name: String,

    /// IP address or hostname
    #[serde(default)]
    pub address: String,

    /// Port; HAProxy uses the frontend port when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Health checking, `enabled` or `disabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,

    /// TLS towards the server, `enabled` or `disabled`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<String>,

    /// Server certificate verification, `none` or `required`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
}

/// `{"_version": N, "data": ...}` envelope used by configuration endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct Versioned<T> {
    pub data: T,
}
