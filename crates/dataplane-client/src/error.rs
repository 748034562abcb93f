//! Dataplane client errors

use thiserror::Error;

/// Errors that can occur when loading a dataplane configuration or talking to
/// the HAProxy dataplane API
#[derive(Debug, Error)]
pub enum DataplaneError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The dataplane API answered with a non-success status
    #[error("HAProxy dataplane API error: {status} - {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, as returned by the server
        body: String,
    },

    /// The raw configuration bytes are not a valid dataplane config document
    #[error("failed to unmarshal HAProxy API config: {0}")]
    Unmarshal(#[source] serde_yaml::Error),

    /// The configuration could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// A response body could not be decoded
    #[error("failed to decode HAProxy API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The timeout is not a valid duration string
    #[error("failed to parse timeout {0:?} from HAProxy API config")]
    InvalidTimeout(String),

    /// The server URL could not be parsed
    #[error("failed to parse server URL {server:?} from HAProxy API config: {reason}")]
    InvalidServerUrl {
        /// The offending server value
        server: String,
        /// Parser message
        reason: String,
    },

    /// A default header could not be built from the credentials
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// The certificate authority data holds no usable PEM certificates
    #[error("failed to parse certificate authority data from HAProxy API config: {0}")]
    InvalidCertificateAuthority(String),

    /// The client certificate or key is absent or malformed
    #[error("failed to parse client certificate/key from HAProxy API config: {0}")]
    InvalidClientCertificate(String),
}
