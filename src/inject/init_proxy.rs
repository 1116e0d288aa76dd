//! Init-container interception
//!
//! Appends the `proxyinit` init container, which installs the iptables rules
//! redirecting pod traffic to Envoy before any application container starts.

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::Result;

use super::annotations;
use super::config::{ProxyInitConfig, SidecarConfig};
use super::proxy::ProxyConfig;
use super::sidecar::{has_init_container, pod_name, render_container, resources_for, spec_mut};

const PROXY_INIT_TEMPLATE: &str = r#"{
  "name": {{ name|tojson }},
  "image": {{ image|tojson }},
  "securityContext": {
    "capabilities": {"add": ["NET_ADMIN"]}
  },
  "env": [
    {"name": "APPMESH_START_ENABLED", "value": "1"},
    {"name": "APPMESH_IGNORE_UID", "value": {{ ignored_uid|tojson }}},
    {"name": "APPMESH_ENVOY_INGRESS_PORT", "value": {{ proxy_ingress_port|tojson }}},
    {"name": "APPMESH_ENVOY_EGRESS_PORT", "value": {{ proxy_egress_port|tojson }}},
    {"name": "APPMESH_APP_PORTS", "value": {{ app_ports|tojson }}},
    {"name": "APPMESH_EGRESS_IGNORED_IP", "value": {{ egress_ignored_ips|tojson }}},
    {"name": "APPMESH_EGRESS_IGNORED_PORTS", "value": {{ egress_ignored_ports|tojson }}},
    {"name": "APPMESH_ENABLE_IPV6", "value": {{ enable_ipv6|flag|tojson }}}
  ]
}"#;

#[derive(Serialize)]
struct ProxyInitVariables<'a> {
    name: &'a str,
    image: &'a str,
    ignored_uid: String,
    proxy_ingress_port: String,
    proxy_egress_port: String,
    app_ports: &'a str,
    egress_ignored_ips: &'a str,
    egress_ignored_ports: &'a str,
    enable_ipv6: bool,
}

/// Adds the traffic interception init container
pub struct InitProxyMutator<'a> {
    proxy: &'a ProxyConfig,
    config: &'a ProxyInitConfig,
    sizing: &'a SidecarConfig,
}

impl<'a> InitProxyMutator<'a> {
    /// Create an init-container mutator
    pub fn new(proxy: &'a ProxyConfig, config: &'a ProxyInitConfig, sizing: &'a SidecarConfig) -> Self {
        Self {
            proxy,
            config,
            sizing,
        }
    }

    /// Append `proxyinit` unless it is already there
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if has_init_container(pod, annotations::PROXY_INIT_CONTAINER) {
            debug!(pod = %pod_name(pod), "proxyinit already present");
            return Ok(());
        }

        let vars = ProxyInitVariables {
            name: annotations::PROXY_INIT_CONTAINER,
            image: &self.config.image,
            ignored_uid: self.proxy.proxy_uid.to_string(),
            proxy_ingress_port: self.proxy.proxy_ingress_port.to_string(),
            proxy_egress_port: self.proxy.proxy_egress_port.to_string(),
            app_ports: &self.proxy.app_ports,
            egress_ignored_ips: &self.proxy.egress_ignored_ips,
            egress_ignored_ports: &self.proxy.egress_ignored_ports,
            enable_ipv6: self.proxy.enable_ipv6,
        };
        let mut container = render_container("proxyInit", PROXY_INIT_TEMPLATE, &vars)?;
        container.resources = Some(resources_for(pod, self.sizing)?);

        spec_mut(pod)
            .init_containers
            .get_or_insert_with(Vec::new)
            .push(container);
        Ok(())
    }
}
