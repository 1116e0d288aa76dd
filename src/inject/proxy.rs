//! Traffic interception
//!
//! Every injected pod needs its inbound and outbound traffic redirected to the
//! proxy. Either the mesh CNI plugin does it (driven by pod annotations) or a
//! privileged init container installs the rules itself. [`ProxyMutator`] picks
//! the mode per pod and delegates:
//!
//! - CNI mode when `appmesh.k8s.aws/appmeshCNI` is "enabled", or when the
//!   annotation is absent and the pod runs on a Fargate profile
//! - init container mode otherwise

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, warn};

use mesh_injector_common::mesh::VirtualNode;
use mesh_injector_common::Result;

use super::annotations;
use super::cni_proxy::CniProxyMutator;
use super::config::{ProxyInitConfig, SidecarConfig};
use super::init_proxy::InitProxyMutator;
use super::sidecar::{annotation, annotation_enabled, pod_name, PROXY_UID};

/// Port Envoy listens on for redirected outbound traffic
pub const PROXY_EGRESS_PORT: u16 = 15001;
/// Port Envoy listens on for redirected inbound traffic
pub const PROXY_INGRESS_PORT: u16 = 15000;
/// SSH stays reachable unless the pod says otherwise
const DEFAULT_EGRESS_IGNORED_PORTS: &str = "22";
/// App ports value meaning "no inbound interception"
const NO_APP_PORTS: &str = "0";

/// Interception settings derived once per pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Comma-separated ports redirected to the proxy on ingress
    pub app_ports: String,
    /// Comma-separated IPs left alone on egress
    pub egress_ignored_ips: String,
    /// Comma-separated ports left alone on egress
    pub egress_ignored_ports: String,
    /// Envoy egress listener port
    pub proxy_egress_port: u16,
    /// Envoy ingress listener port
    pub proxy_ingress_port: u16,
    /// UID excluded from interception
    pub proxy_uid: i64,
    /// Install IPv6 rules too
    pub enable_ipv6: bool,
}

impl ProxyConfig {
    /// Resolve interception settings from config, virtual node and pod annotations
    pub fn derive(config: &ProxyInitConfig, vn: &VirtualNode, pod: &Pod) -> Self {
        let app_ports = match annotation(pod, annotations::PORTS) {
            Some(ports) => ports.to_string(),
            None => listener_ports(vn),
        };
        let egress_ignored_ips = annotation(pod, annotations::EGRESS_IGNORED_IPS)
            .unwrap_or(&config.ignored_ips)
            .to_string();
        let egress_ignored_ports = annotation(pod, annotations::EGRESS_IGNORED_PORTS)
            .unwrap_or(DEFAULT_EGRESS_IGNORED_PORTS)
            .to_string();
        let enable_ipv6 = match annotation(pod, annotations::IPV6) {
            Some(v) if v.eq_ignore_ascii_case(annotations::ENABLED) => true,
            Some(v) if v.eq_ignore_ascii_case(annotations::DISABLED) => false,
            Some(v) => {
                warn!(
                    pod = %pod_name(pod),
                    value = v,
                    "unsupported {} value, using configured default",
                    annotations::IPV6
                );
                config.enable_ipv6
            }
            None => config.enable_ipv6,
        };

        Self {
            app_ports,
            egress_ignored_ips,
            egress_ignored_ports,
            proxy_egress_port: PROXY_EGRESS_PORT,
            proxy_ingress_port: PROXY_INGRESS_PORT,
            proxy_uid: PROXY_UID,
            enable_ipv6,
        }
    }
}

fn listener_ports(vn: &VirtualNode) -> String {
    let ports = vn.listener_ports();
    if ports.is_empty() {
        return NO_APP_PORTS.to_string();
    }
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Whether interception for this pod is left to the CNI plugin
pub fn uses_cni(pod: &Pod) -> bool {
    if let Some(enabled) = annotation_enabled(pod, annotations::CNI) {
        return enabled;
    }
    pod.labels()
        .get(annotations::FARGATE_PROFILE_LABEL)
        .is_some_and(|profile| !profile.is_empty())
}

/// Sets up traffic interception in whichever mode the pod needs
pub struct ProxyMutator<'a> {
    config: &'a ProxyInitConfig,
    sizing: &'a SidecarConfig,
    vn: &'a VirtualNode,
}

impl<'a> ProxyMutator<'a> {
    /// Create a proxy mutator for pods selected by `vn`
    pub fn new(config: &'a ProxyInitConfig, sizing: &'a SidecarConfig, vn: &'a VirtualNode) -> Self {
        Self { config, sizing, vn }
    }

    /// Apply CNI annotations or the init container
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        let proxy = ProxyConfig::derive(self.config, self.vn, pod);
        if uses_cni(pod) {
            debug!(pod = %pod_name(pod), "traffic interception via CNI");
            CniProxyMutator::new(&proxy).mutate(pod)
        } else {
            debug!(pod = %pod_name(pod), "traffic interception via init container");
            InitProxyMutator::new(&proxy, self.config, self.sizing).mutate(pod)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::sidecar::has_init_container;
    use crate::inject::testing::{annotated_pod, app_pod, pod};
    use mesh_injector_common::mesh::PortProtocol;
    use rstest::rstest;
    use serde_json::json;

    fn vn_with_ports(ports: &[u16]) -> VirtualNode {
        ports.iter().fold(VirtualNode::new("vn", "default"), |vn, port| {
            vn.with_listener(*port, PortProtocol::Http)
        })
    }

    #[rstest]
    #[case::listeners(&[80, 443], "80,443")]
    #[case::single(&[8080], "8080")]
    #[case::no_listeners(&[], "0")]
    fn test_app_ports_from_listeners(#[case] ports: &[u16], #[case] expected: &str) {
        let proxy = ProxyConfig::derive(&ProxyInitConfig::default(), &vn_with_ports(ports), &app_pod());
        assert_eq!(proxy.app_ports, expected);
    }

    #[test]
    fn test_annotations_take_precedence() {
        let pod = annotated_pod(json!({
            "appmesh.k8s.aws/ports": "9090",
            "appmesh.k8s.aws/egressIgnoredIPs": "10.0.0.1",
            "appmesh.k8s.aws/egressIgnoredPorts": "22,3306",
            "appmesh.k8s.aws/ipv6": "disabled"
        }));
        let proxy = ProxyConfig::derive(&ProxyInitConfig::default(), &vn_with_ports(&[80]), &pod);
        assert_eq!(proxy.app_ports, "9090");
        assert_eq!(proxy.egress_ignored_ips, "10.0.0.1");
        assert_eq!(proxy.egress_ignored_ports, "22,3306");
        assert!(!proxy.enable_ipv6);
    }

    #[test]
    fn test_defaults_without_annotations() {
        let proxy = ProxyConfig::derive(&ProxyInitConfig::default(), &vn_with_ports(&[80]), &app_pod());
        assert_eq!(proxy.egress_ignored_ips, "169.254.169.254");
        assert_eq!(proxy.egress_ignored_ports, "22");
        assert_eq!(proxy.proxy_egress_port, 15001);
        assert_eq!(proxy.proxy_ingress_port, 15000);
        assert_eq!(proxy.proxy_uid, 1337);
        assert!(proxy.enable_ipv6);
    }

    #[rstest]
    #[case::enabled_annotation(json!({"appmesh.k8s.aws/appmeshCNI": "ENABLED"}), json!({}), true)]
    #[case::disabled_annotation_beats_fargate(
        json!({"appmesh.k8s.aws/appmeshCNI": "disabled"}),
        json!({"eks.amazonaws.com/fargate-profile": "fp-default"}),
        false
    )]
    #[case::fargate_label(json!({}), json!({"eks.amazonaws.com/fargate-profile": "fp-default"}), true)]
    #[case::empty_fargate_label(json!({}), json!({"eks.amazonaws.com/fargate-profile": ""}), false)]
    #[case::nothing(json!({}), json!({}), false)]
    fn test_uses_cni(
        #[case] annotations: serde_json::Value,
        #[case] labels: serde_json::Value,
        #[case] expected: bool,
    ) {
        let pod = pod(json!({
            "metadata": {"name": "app", "annotations": annotations, "labels": labels},
            "spec": {"containers": [{"name": "app"}]}
        }));
        assert_eq!(uses_cni(&pod), expected);
    }

    #[test]
    fn test_mutator_dispatches_on_mode() {
        let config = ProxyInitConfig::default();
        let sizing = SidecarConfig::default();
        let vn = vn_with_ports(&[80]);
        let mutator = ProxyMutator::new(&config, &sizing, &vn);

        let mut init = app_pod();
        mutator.mutate(&mut init).expect("init mode should apply");
        assert!(has_init_container(&init, annotations::PROXY_INIT_CONTAINER));
        assert!(init.annotations().get(annotations::PORTS).is_none());

        let mut cni = annotated_pod(json!({"appmesh.k8s.aws/appmeshCNI": "enabled"}));
        mutator.mutate(&mut cni).expect("cni mode should apply");
        assert!(!has_init_container(&cni, annotations::PROXY_INIT_CONTAINER));
        assert_eq!(
            cni.annotations().get(annotations::PORTS).map(String::as_str),
            Some("80")
        );
    }
}
