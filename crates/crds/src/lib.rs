//! HAProxy load balancer CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the HAProxy load balancer controller.

pub mod haproxy_load_balancer;

pub use haproxy_load_balancer::*;
