//! Unit tests for the secret-advancing part of the reconciler

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::reconciler::{SecretProgress, advance_secrets, check_dataplane};
    use crate::test_utils::*;
    use dataplane_client::DataplaneConfig;
    use haproxy_lb::SecretState;
    use haproxy_lb::secrets::{SECRET_DATA_KEY_CA_CERT, SECRET_DATA_KEY_USERNAME, SECRET_DATA_KEY_VALUE};
    use k8s_openapi::api::core::v1::Secret;

    fn data_of(secret: &Secret, key: &str) -> Vec<u8> {
        secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|v| v.0.clone())
            .unwrap_or_else(|| panic!("secret has no {key} entry"))
    }

    #[tokio::test]
    async fn test_advance_without_address_stops_after_bootstrap() {
        let (manager, store) = create_test_manager();
        let lb = create_test_load_balancer("lb1", "ns1", None);

        let progress = advance_secrets(&manager, &lb).await.unwrap();
        assert!(matches!(progress, SecretProgress::AwaitingAddress));
        assert_eq!(store.names_in("ns1"), vec!["lb1-haproxy-bootstrap", "lb1-haproxy-ca"]);
    }

    #[tokio::test]
    async fn test_advance_with_address_creates_all_secrets() {
        let (manager, store) = create_test_manager();
        let lb = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));

        let config = match advance_secrets(&manager, &lb).await.unwrap() {
            SecretProgress::Complete(config) => config,
            other => panic!("expected complete progress, got {other:?}"),
        };
        assert_eq!(config.server, "https://10.0.0.5:5556/v1");
        assert_eq!(
            manager.secret_state("ns1", "lb1").await.unwrap(),
            SecretState::ConfigReady
        );
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_advance_is_idempotent() {
        let (manager, _store) = create_test_manager();
        let lb = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));

        let SecretProgress::Complete(first) = advance_secrets(&manager, &lb).await.unwrap() else {
            panic!("expected complete progress");
        };
        let ca_before = manager.get_ca_secret("ns1", "lb1").await.unwrap();

        let SecretProgress::Complete(second) = advance_secrets(&manager, &lb).await.unwrap() else {
            panic!("expected complete progress");
        };
        let ca_after = manager.get_ca_secret("ns1", "lb1").await.unwrap();

        assert_eq!(first, second, "config should not be reissued");
        assert_eq!(
            ca_before.data.as_ref().and_then(|d| d.get(SECRET_DATA_KEY_CA_CERT)),
            ca_after.data.as_ref().and_then(|d| d.get(SECRET_DATA_KEY_CA_CERT))
        );
    }

    #[tokio::test]
    async fn test_advance_picks_up_address_later() {
        let (manager, store) = create_test_manager();
        let pending = create_test_load_balancer("lb1", "ns1", None);
        let addressed = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));

        advance_secrets(&manager, &pending).await.unwrap();
        assert_eq!(store.len(), 2);

        let progress = advance_secrets(&manager, &addressed).await.unwrap();
        assert!(matches!(progress, SecretProgress::Complete(_)));
        assert!(store.contains("ns1", "lb1-haproxy-config"));
    }

    #[tokio::test]
    async fn test_advance_rotates_config_on_address_change() {
        let (manager, _store) = create_test_manager();
        let old = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));
        let new = create_test_load_balancer("lb1", "ns1", Some("10.0.0.6"));

        let SecretProgress::Complete(before) = advance_secrets(&manager, &old).await.unwrap() else {
            panic!("expected complete progress");
        };
        let SecretProgress::Complete(after) = advance_secrets(&manager, &new).await.unwrap() else {
            panic!("expected complete progress");
        };

        assert_eq!(before.server, "https://10.0.0.5:5556/v1");
        assert_eq!(after.server, "https://10.0.0.6:5556/v1");
        assert_ne!(before.client_certificate_data, after.client_certificate_data);
        assert_eq!(before.certificate_authority_data, after.certificate_authority_data);
        assert_eq!(before.username, after.username);
    }

    #[tokio::test]
    async fn test_advance_rotates_derived_secrets_when_ca_is_recreated() {
        let (manager, store) = create_test_manager();
        let lb = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));

        let SecretProgress::Complete(before) = advance_secrets(&manager, &lb).await.unwrap() else {
            panic!("expected complete progress");
        };
        let old_bootstrap = manager.get_bootstrap_secret("ns1", "lb1").await.unwrap();

        // The CA secret disappears while bootstrap and config survive
        manager.delete_ca_secret("ns1", "lb1").await.unwrap();
        assert_eq!(store.names_in("ns1"), vec!["lb1-haproxy-bootstrap", "lb1-haproxy-config"]);

        let SecretProgress::Complete(after) = advance_secrets(&manager, &lb).await.unwrap() else {
            panic!("expected complete progress");
        };
        let ca = manager.get_ca_secret("ns1", "lb1").await.unwrap();
        let new_ca_cert = data_of(&ca, SECRET_DATA_KEY_CA_CERT);

        assert_ne!(before.certificate_authority_data, new_ca_cert);
        assert_eq!(after.certificate_authority_data, new_ca_cert);
        assert_eq!(after.username.as_bytes(), data_of(&ca, SECRET_DATA_KEY_USERNAME).as_slice());
        let stored = manager.get_dataplane_config("ns1", "lb1").await.unwrap();
        assert_eq!(stored, after);

        let bootstrap = manager.get_bootstrap_secret("ns1", "lb1").await.unwrap();
        let bootstrap_value = String::from_utf8(data_of(&bootstrap, SECRET_DATA_KEY_VALUE)).unwrap();
        assert_ne!(data_of(&old_bootstrap, SECRET_DATA_KEY_VALUE), bootstrap_value.as_bytes());
        let new_ca_text = String::from_utf8(new_ca_cert).unwrap();
        let ca_body_line = new_ca_text.lines().nth(1).unwrap();
        assert!(bootstrap_value.contains(ca_body_line), "bootstrap embeds the new CA");
        assert_eq!(
            manager.secret_state("ns1", "lb1").await.unwrap(),
            SecretState::ConfigReady
        );
    }

    #[tokio::test]
    async fn test_advance_rotates_derived_secrets_when_ca_is_replaced() {
        let (manager, store) = create_test_manager();
        let lb1 = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));
        let lb2 = create_test_load_balancer("lb2", "ns1", None);

        let SecretProgress::Complete(before) = advance_secrets(&manager, &lb1).await.unwrap() else {
            panic!("expected complete progress");
        };
        advance_secrets(&manager, &lb2).await.unwrap();

        // Overwrite lb1's CA secret with different CA material
        let mut replacement = manager.get_ca_secret("ns1", "lb2").await.unwrap();
        replacement.metadata.name = Some("lb1-haproxy-ca".to_string());
        let replacement_cert = data_of(&replacement, SECRET_DATA_KEY_CA_CERT);
        let replacement_user = data_of(&replacement, SECRET_DATA_KEY_USERNAME);
        store.insert(replacement);

        let SecretProgress::Complete(after) = advance_secrets(&manager, &lb1).await.unwrap() else {
            panic!("expected complete progress");
        };
        assert_ne!(before.certificate_authority_data, after.certificate_authority_data);
        assert_eq!(after.certificate_authority_data, replacement_cert);
        assert_eq!(after.username.as_bytes(), replacement_user.as_slice());
        assert_eq!(after.server, "https://10.0.0.5:5556/v1");

        let bootstrap = manager.get_bootstrap_secret("ns1", "lb1").await.unwrap();
        let bootstrap_value = String::from_utf8(data_of(&bootstrap, SECRET_DATA_KEY_VALUE)).unwrap();
        let replacement_text = String::from_utf8(replacement_cert).unwrap();
        assert!(bootstrap_value.contains(replacement_text.lines().nth(1).unwrap()));
    }

    #[tokio::test]
    async fn test_advance_rejects_resource_without_namespace() {
        let (manager, store) = create_test_manager();
        let mut lb = create_test_load_balancer("lb1", "ns1", None);
        lb.metadata.namespace = None;

        let err = advance_secrets(&manager, &lb).await.unwrap_err();
        assert!(matches!(err, ControllerError::InvalidResource(_)), "got {err}");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_after_advance() {
        let (manager, store) = create_test_manager();
        let lb = create_test_load_balancer("lb1", "ns1", Some("10.0.0.5"));

        advance_secrets(&manager, &lb).await.unwrap();
        manager.delete_all_secrets("ns1", "lb1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_dataplane_check_fails_without_client_certificate() {
        let config = DataplaneConfig {
            server: "https://127.0.0.1:5556/v1".to_string(),
            ..Default::default()
        };
        assert!(!check_dataplane(&config).await);
    }

    #[tokio::test]
    async fn test_dataplane_check_fails_when_unreachable() {
        let (manager, _store) = create_test_manager();
        // Nothing listens on port 5556 of the loopback address
        let lb = create_test_load_balancer("lb1", "ns1", Some("127.0.0.1"));

        let SecretProgress::Complete(mut config) = advance_secrets(&manager, &lb).await.unwrap() else {
            panic!("expected complete progress");
        };
        config.timeout = "2s".to_string();
        assert!(!check_dataplane(&config).await);
    }
}
