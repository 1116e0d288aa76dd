//! CNI-mode interception: hand the interception settings to the CNI plugin
//! through pod annotations.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use mesh_injector_common::Result;

use super::annotations;
use super::proxy::ProxyConfig;

/// Writes the interception annotations read by the CNI plugin
pub struct CniProxyMutator<'a> {
    proxy: &'a ProxyConfig,
}

impl<'a> CniProxyMutator<'a> {
    /// Create a CNI mutator for derived settings
    pub fn new(proxy: &'a ProxyConfig) -> Self {
        Self { proxy }
    }

    /// Merge the interception annotations; computed values replace existing ones
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        let computed = [
            (annotations::PORTS, self.proxy.app_ports.clone()),
            (annotations::EGRESS_IGNORED_IPS, self.proxy.egress_ignored_ips.clone()),
            (annotations::EGRESS_IGNORED_PORTS, self.proxy.egress_ignored_ports.clone()),
            (annotations::PROXY_EGRESS_PORT, self.proxy.proxy_egress_port.to_string()),
            (annotations::PROXY_INGRESS_PORT, self.proxy.proxy_ingress_port.to_string()),
            (annotations::IGNORED_UID, self.proxy.proxy_uid.to_string()),
            (annotations::SIDECAR_INJECT, annotations::ENABLED.to_string()),
        ];
        let existing = pod.annotations_mut();
        for (key, value) in computed {
            existing.insert(key.to_string(), value);
        }
        Ok(())
    }
}
