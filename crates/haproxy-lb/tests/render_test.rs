//! Bootstrap data rendering against a checked-in golden file

use crds::{HAProxyLoadBalancer, HAProxyLoadBalancerSpec, SSHUser};
use haproxy_lb::RenderConfiguration;

const CA_CERT: &str = include_str!("fixtures/ca.crt");
const CA_KEY: &str = include_str!("fixtures/ca.key");
const GOLDEN: &str = include_str!("fixtures/bootstrap-data.golden");

fn load_balancer() -> HAProxyLoadBalancer {
    HAProxyLoadBalancer::new(
        "lb1",
        HAProxyLoadBalancerSpec {
            user: Some(SSHUser {
                name: "capv".to_string(),
                authorized_keys: vec!["ssh-rsa AAAAB3NzaC1yc2E capv@example".to_string()],
            }),
            ..Default::default()
        },
    )
}

fn render() -> Vec<u8> {
    RenderConfiguration::new()
        .with_bootstrap_info(
            &load_balancer(),
            "admin",
            "s3cret",
            CA_CERT.as_bytes(),
            CA_KEY.as_bytes(),
        )
        .render_bootstrap_data()
        .expect("bootstrap data should render")
}

#[test]
fn test_bootstrap_data_matches_golden_file() {
    let rendered = String::from_utf8(render()).expect("bootstrap data is UTF-8");
    assert_eq!(rendered, GOLDEN);
}

#[test]
fn test_bootstrap_data_is_byte_identical_across_calls() {
    assert_eq!(render(), render());
}

#[test]
fn test_bootstrap_data_embeds_ca_material() {
    let rendered = String::from_utf8(render()).expect("bootstrap data is UTF-8");
    for line in CA_CERT.lines().chain(CA_KEY.lines()) {
        assert!(rendered.contains(&format!("    {line}\n")), "missing line {line:?}");
    }
}
