//! Prints the HAProxyLoadBalancer CustomResourceDefinition as YAML.
//!
//! Usage: `cargo run -p crds --bin crdgen > config/crd/haproxyloadbalancer.yaml`

use crds::HAProxyLoadBalancer;
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crd = HAProxyLoadBalancer::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
