//! HAProxy and cloud-init templates
//!
//! Block tags sit inline with the surrounding text so no line is treated as
//! standalone and stripped.

pub(crate) const HAPROXY_CONFIGURATION_NAME: &str = "haproxy.cfg";

pub(crate) const BOOTSTRAP_DATA_NAME: &str = "cloud-init";

// Based on kubespray's roles/kubernetes/node/templates/loadbalancer/haproxy.cfg.j2
pub(crate) const HAPROXY_CONFIGURATION_TEMPLATE: &str = r#"global
    log                      stdout format raw local0 info
    chroot                   /var/lib/haproxy
    stats                    timeout 30s
    user                     haproxy
    group                    haproxy
    stats                    socket /run/haproxy.sock user haproxy group haproxy mode 660 level admin
    master-worker
    maxconn                  4000
    ca-base /etc/ssl/certs
    crt-base /etc/ssl/private

    ssl-default-bind-ciphers ECDH+AESGCM:DH+AESGCM:ECDH+AES256:DH+AES256:ECDH+AES128:DH+AES:RSA+AESGCM:RSA+AES:!aNULL:!MD5:!DSS
    ssl-default-bind-options no-sslv3

defaults
    mode                     http
    log                      global
    option                   tcplog
    option                   dontlognull
    option                   http-server-close
    option                   redispatch
    retries                  5
    timeout http-request     5m
    timeout queue            5m
    timeout connect          30s
    timeout client           1m
    timeout server           1m
    timeout tunnel           1h
    timeout http-keep-alive  30s
    timeout check            30s
    maxconn                  4000


userlist controller
user {{username}} insecure-password {{password}}

frontend healthz
  bind *:8081
  mode http
  monitor-uri /healthz

frontend kube_api_frontend
  bind *:{{port}} name lb
  mode tcp
  option tcplog
  default_backend kube_api_backend

backend kube_api_backend
  mode tcp
  balance leastconn
  default-server inter 10s downinter 10s rise 5 fall 3 slowstart 120s maxconn 1000 maxqueue 256 weight 100
  option httpchk GET /healthz
  http-check expect status 200{{#each addresses}}
  server {{node_name}} {{ip}}:{{@root.port}} check check-ssl verify none{{/each}}

program api
command dataplaneapi --scheme=https --haproxy-bin=/usr/sbin/haproxy --config-file=/etc/haproxy/haproxy.cfg --reload-cmd="/usr/bin/systemctl restart haproxy" --reload-delay=5 --tls-host=0.0.0.0 --tls-port=5556 --tls-ca=/etc/haproxy/ca.crt --tls-certificate=/etc/haproxy/server.crt --tls-key=/etc/haproxy/server.key --userlist=controller
no option start-on-reload
"#;

pub(crate) const BOOTSTRAP_DATA_TEMPLATE: &str = r#"## template: jinja
#cloud-config

write_files:
- path: /etc/haproxy/haproxy.cfg
  owner: haproxy:haproxy
  permissions: "0640"
  content: |
{{indent 4 haproxy_configuration}}
- path: /etc/haproxy/ca.crt
  owner: haproxy:haproxy
  permissions: "0640"
  content: |
{{bytes_indent 4 certificate_authority_data}}
- path: /etc/haproxy/ca.key
  owner: haproxy:haproxy
  permissions: "0440"
  content: |
{{bytes_indent 4 certificate_authority_key}}

runcmd:
- "hostname \"{{hostname}}\""
- "hostnamectl set-hostname \"{{hostname}}\""
- "echo \"::1         ipv6-localhost ipv6-loopback\" >/etc/hosts"
- "echo \"127.0.0.1   localhost {{hostname}}\" >>/etc/hosts"
- "echo \"127.0.0.1   {{hostname}}\" >>/etc/hosts"
- "echo \"{{hostname}}\" >/etc/hostname"
- "new-cert.sh -1 /etc/haproxy/ca.crt -2 /etc/haproxy/ca.key -3 \"127.0.0.1,{{ipv4_address}}\" -4 \"localhost\" \"{{hostname}}\" /etc/haproxy"{{#if ssh_user}}
users:
- name: {{ssh_user.name}}
  sudo: ALL=(ALL) NOPASSWD:ALL{{#if ssh_user.authorized_keys}}
  ssh_authorized_keys:{{#each ssh_user.authorized_keys}}
  - {{yaml_quote this}}{{/each}}{{/if}}{{/if}}
"#;
