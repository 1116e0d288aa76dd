//! VirtualNode snapshot

use serde::{Deserialize, Serialize};

use super::resolve_aws_name;

/// A virtual node selecting the pod being injected
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNode {
    /// Kubernetes object name
    pub name: String,
    /// Kubernetes namespace
    pub namespace: String,
    /// Name in the control plane; defaults to `<name>_<namespace>` when empty
    #[serde(default)]
    pub aws_name: String,
    /// Listeners declared on the node
    #[serde(default)]
    pub listeners: Vec<Listener>,
    /// How other nodes discover this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_discovery: Option<ServiceDiscovery>,
}

/// A listener on a virtual node or gateway
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    /// Port and protocol served by the listener
    pub port_mapping: PortMapping,
}

/// Port and protocol pair
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct PortMapping {
    /// Listener port
    pub port: u16,
    /// Application protocol
    pub protocol: PortProtocol,
}

/// Listener protocols understood by the mesh
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// HTTP/1.1
    Http,
    /// HTTP/2
    Http2,
    /// gRPC
    Grpc,
    /// Raw TCP
    Tcp,
}

/// Service discovery configuration
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ServiceDiscovery {
    /// DNS-based discovery
    Dns {
        /// Hostname resolved by callers
        hostname: String,
    },
    /// AWS Cloud Map based discovery
    #[serde(rename_all = "camelCase")]
    AwsCloudMap {
        /// Cloud Map namespace
        namespace_name: String,
        /// Cloud Map service
        service_name: String,
    },
}

impl Listener {
    /// Create a listener for `port`
    pub fn new(port: u16, protocol: PortProtocol) -> Self {
        Self {
            port_mapping: PortMapping { port, protocol },
        }
    }
}

impl VirtualNode {
    /// Create a virtual node snapshot without listeners
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Add a listener
    pub fn with_listener(mut self, port: u16, protocol: PortProtocol) -> Self {
        self.listeners.push(Listener::new(port, protocol));
        self
    }

    /// Set service discovery
    pub fn with_service_discovery(mut self, discovery: ServiceDiscovery) -> Self {
        self.service_discovery = Some(discovery);
        self
    }

    /// Name of the node in the control plane
    pub fn resolved_aws_name(&self) -> String {
        resolve_aws_name(&self.aws_name, &self.name, &self.namespace)
    }

    /// Listener ports in declaration order
    pub fn listener_ports(&self) -> Vec<u16> {
        self.listeners.iter().map(|l| l.port_mapping.port).collect()
    }

    /// Whether the node is registered in AWS Cloud Map
    pub fn uses_cloud_map(&self) -> bool {
        matches!(
            self.service_discovery,
            Some(ServiceDiscovery::AwsCloudMap { .. })
        )
    }
}
