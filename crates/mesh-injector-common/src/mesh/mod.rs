//! Read-only snapshots of mesh objects consumed by the injector
//!
//! These are the already-resolved views of Mesh, VirtualNode and VirtualGateway
//! resources that the admission layer hands to the pipeline. They carry only
//! what injection needs: control-plane names, ownership, listener ports and
//! service discovery mode.

mod virtual_gateway;
mod virtual_node;

pub use virtual_gateway::VirtualGateway;
pub use virtual_node::{Listener, PortMapping, PortProtocol, ServiceDiscovery, VirtualNode};

use serde::{Deserialize, Serialize};

/// A service mesh as seen by the injector
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Mesh {
    /// Kubernetes object name
    pub name: String,
    /// Mesh name in the control plane
    pub aws_name: String,
    /// Account that owns the mesh when it is shared across accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_owner: Option<String>,
}

impl Mesh {
    /// Create a mesh snapshot owned by the local account
    pub fn new(name: impl Into<String>, aws_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aws_name: aws_name.into(),
            mesh_owner: None,
        }
    }

    /// Set the owning account
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.mesh_owner = Some(owner.into());
        self
    }

    /// Mesh name as Envoy must address it from `account_id`
    ///
    /// Meshes shared from another account are addressed as `name@owner`.
    pub fn augmented_name(&self, account_id: &str) -> String {
        match self.mesh_owner.as_deref() {
            Some(owner) if owner != account_id => format!("{}@{}", self.aws_name, owner),
            _ => self.aws_name.clone(),
        }
    }
}

/// Control-plane name for a namespaced mesh object
///
/// Objects without an explicit name default to `<name>_<namespace>`.
pub(crate) fn resolve_aws_name(aws_name: &str, name: &str, namespace: &str) -> String {
    if aws_name.is_empty() {
        format!("{}_{}", name, namespace)
    } else {
        aws_name.to_string()
    }
}
