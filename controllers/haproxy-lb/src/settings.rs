//! Controller settings read from environment variables.

use crate::error::ControllerError;
use std::time::Duration;

/// Default bound on each secret store call, in seconds
pub const DEFAULT_SECRET_OPERATION_TIMEOUT_SECONDS: u64 = 30;

/// Default requeue delay while waiting for a load balancer address, in seconds
pub const DEFAULT_ADDRESS_REQUEUE_SECONDS: u64 = 30;

/// Runtime settings of the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Bound on each secret store call
    pub secret_operation_timeout: Duration,
    /// Requeue delay while a load balancer has no address
    pub address_requeue: Duration,
    /// Whether to query the dataplane API to compute `status.ready`
    pub dataplane_check_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: None,
            secret_operation_timeout: Duration::from_secs(DEFAULT_SECRET_OPERATION_TIMEOUT_SECONDS),
            address_requeue: Duration::from_secs(DEFAULT_ADDRESS_REQUEUE_SECONDS),
            dataplane_check_enabled: true,
        }
    }
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        Ok(Self {
            namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            secret_operation_timeout: seconds(
                &lookup,
                "SECRET_OPERATION_TIMEOUT_SECONDS",
                defaults.secret_operation_timeout,
            )?,
            address_requeue: seconds(&lookup, "ADDRESS_REQUEUE_SECONDS", defaults.address_requeue)?,
            dataplane_check_enabled: flag(
                &lookup,
                "DATAPLANE_CHECK_ENABLED",
                defaults.dataplane_check_enabled,
            )?,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ControllerError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ControllerError::InvalidConfig(format!(
                "{key} must be a positive number of seconds, got {value:?}"
            ))),
        },
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, ControllerError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ControllerError::InvalidConfig(format!(
            "{key} must be true or false, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.secret_operation_timeout, Duration::from_secs(30));
        assert_eq!(settings.address_requeue, Duration::from_secs(30));
        assert!(settings.dataplane_check_enabled);
        assert!(settings.namespace.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = settings(&[
            ("WATCH_NAMESPACE", "capv-system"),
            ("SECRET_OPERATION_TIMEOUT_SECONDS", "5"),
            ("ADDRESS_REQUEUE_SECONDS", "10"),
            ("DATAPLANE_CHECK_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(settings.namespace.as_deref(), Some("capv-system"));
        assert_eq!(settings.secret_operation_timeout, Duration::from_secs(5));
        assert_eq!(settings.address_requeue, Duration::from_secs(10));
        assert!(!settings.dataplane_check_enabled);
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let settings = settings(&[("WATCH_NAMESPACE", "")]).unwrap();
        assert!(settings.namespace.is_none());
    }

    #[test]
    fn test_invalid_values() {
        for (key, value) in [
            ("SECRET_OPERATION_TIMEOUT_SECONDS", "abc"),
            ("SECRET_OPERATION_TIMEOUT_SECONDS", "0"),
            ("ADDRESS_REQUEUE_SECONDS", "-1"),
            ("DATAPLANE_CHECK_ENABLED", "maybe"),
        ] {
            let err = settings(&[(key, value)]).unwrap_err();
            assert!(matches!(err, ControllerError::InvalidConfig(_)), "{key}={value}: {err}");
            assert!(err.to_string().contains(key));
        }
    }
}
