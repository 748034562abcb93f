//! HAProxy Dataplane API Client
//!
//! Configuration model and mutual-TLS HTTP client for the HAProxy dataplane
//! API that runs on every load balancer VM.
//!
//! # Example
//!
//! ```no_run
//! use dataplane_client::{DataplaneClient, load_dataplane_config};
//!
//! # async fn example(raw: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_dataplane_config(raw)?;
//! let client = DataplaneClient::from_config(&config)?;
//!
//! let info = client.info().await?;
//! println!("dataplane API {}", info.api.version);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod duration;
pub mod error;
pub mod models;

pub use client::{DataplaneClient, USER_AGENT};
pub use config::{
    DEFAULT_PASSWORD, DEFAULT_TIMEOUT, DEFAULT_USERNAME, DataplaneConfig, load_dataplane_config,
};
pub use duration::parse_go_duration;
pub use error::DataplaneError;
pub use models::{ApiInfo, Info, RawConfiguration, Server};
