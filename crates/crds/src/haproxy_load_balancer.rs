//! HAProxyLoadBalancer CRD
//!
//! Describes a self-hosted HAProxy virtual machine that fronts a cluster's
//! Kubernetes API server. The controller derives three secrets from each
//! resource: signing CA material, cloud-init bootstrap data and the dataplane
//! API client configuration.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer that keeps an HAProxyLoadBalancer around until its secrets are removed.
pub const HAPROXY_LOAD_BALANCER_FINALIZER: &str =
    "haproxyloadbalancer.infrastructure.cluster.x-k8s.io";

/// Label carrying the name of the cluster a resource belongs to.
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha3",
    kind = "HAProxyLoadBalancer",
    namespaced,
    status = "HAProxyLoadBalancerStatus",
    shortname = "haproxylb",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".status.address"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HAProxyLoadBalancerSpec {
    /// Information used to deploy the load balancer VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_machine_configuration: Option<VirtualMachineCloneSpec>,

    /// User granted remote (break-glass) access to the deployed VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<SSHUser>,
}

/// SSH user written into the VM's cloud-init `users` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SSHUser {
    /// Login name
    pub name: String,

    /// Public keys allowed to log in as this user
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorized_keys: Vec<String>,
}

/// vSphere clone parameters for the load balancer VM
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineCloneSpec {
    /// Name or inventory path of the template used to clone the VM
    pub template: String,

    /// Clone strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_mode: Option<CloneMode>,

    /// Snapshot used for linked clones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,

    /// vCenter server address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Datacenter in which the VM is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// VM folder the clone is placed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Datastore holding the VM's disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datastore: Option<String>,

    /// Storage policy applied to the VM's disks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_policy_name: Option<String>,

    /// Resource pool the VM runs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_pool: Option<String>,

    /// Network configuration of the VM
    #[serde(default)]
    pub network: NetworkSpec,

    /// Virtual CPUs; the template's count when unset
    #[serde(rename = "numCPUs", default, skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<i32>,

    /// Memory in MiB; the template's size when unset
    #[serde(rename = "memoryMiB", default, skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<i64>,

    /// Boot disk size in GiB; the template's size when unset
    #[serde(rename = "diskGiB", default, skip_serializing_if = "Option::is_none")]
    pub disk_gib: Option<i32>,
}

/// How the VM is cloned from its template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CloneMode {
    /// Independent copy of the template disks
    FullClone,

    /// Copy-on-write clone backed by a snapshot
    LinkedClone,
}

/// VM network configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Network devices attached to the VM
    #[serde(default)]
    pub devices: Vec<NetworkDeviceSpec>,
}

/// A single VM network device
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeviceSpec {
    /// Name of the vSphere network the device is attached to
    pub network_name: String,

    /// Obtain an IPv4 address via DHCP
    #[serde(default)]
    pub dhcp4: bool,

    /// Obtain an IPv6 address via DHCP
    #[serde(default)]
    pub dhcp6: bool,

    /// Static addresses in CIDR notation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addrs: Vec<String>,

    /// IPv4 default gateway for static addressing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway4: Option<String>,

    /// DNS servers for the device
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
}

/// Observed state of an HAProxyLoadBalancer
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HAProxyLoadBalancerStatus {
    /// Whether the load balancer's dataplane API is reachable with the issued credentials
    #[serde(default)]
    pub ready: bool,

    /// IP address of the load balancer VM
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl HAProxyLoadBalancer {
    /// The load balancer's address, if one has been observed.
    pub fn address(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.address.as_deref())
            .filter(|a| !a.is_empty())
    }

    /// Name of the owning cluster, taken from the cluster-name label.
    pub fn cluster_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(CLUSTER_NAME_LABEL))
            .map(String::as_str)
    }

    /// Whether the finalizer is present on the resource.
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|name| name == HAPROXY_LOAD_BALANCER_FINALIZER))
    }

    /// Whether the resource has been marked for deletion.
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
