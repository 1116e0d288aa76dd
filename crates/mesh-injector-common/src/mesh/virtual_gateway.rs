//! VirtualGateway snapshot

use serde::{Deserialize, Serialize};

use super::resolve_aws_name;
use super::virtual_node::Listener;

/// A virtual gateway selecting the pod being injected
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VirtualGateway {
    /// Kubernetes object name
    pub name: String,
    /// Kubernetes namespace
    pub namespace: String,
    /// Name in the control plane; defaults to `<name>_<namespace>` when empty
    #[serde(default)]
    pub aws_name: String,
    /// Listeners declared on the gateway
    #[serde(default)]
    pub listeners: Vec<Listener>,
}

impl VirtualGateway {
    /// Create a virtual gateway snapshot
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Name of the gateway in the control plane
    pub fn resolved_aws_name(&self) -> String {
        resolve_aws_name(&self.aws_name, &self.name, &self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_aws_name_wins() {
        let mut vg = VirtualGateway::new("gw", "ingress");
        assert_eq!(vg.resolved_aws_name(), "gw_ingress");
        vg.aws_name = "edge".to_string();
        assert_eq!(vg.resolved_aws_name(), "edge");
    }
}
