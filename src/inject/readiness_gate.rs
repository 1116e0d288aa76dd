//! Cloud Map readiness gate
//!
//! Pods registered in Cloud Map only become Ready once the health reconciler
//! has flipped the `aws-cloudmap-healthy` condition.

use k8s_openapi::api::core::v1::{Pod, PodReadinessGate};
use tracing::debug;

use mesh_injector_common::mesh::VirtualNode;
use mesh_injector_common::Result;

use super::annotations;
use super::sidecar::{pod_name, spec_mut};

/// Adds the Cloud Map health readiness gate for Cloud Map backed nodes
pub struct CloudMapReadinessGateMutator<'a> {
    vn: &'a VirtualNode,
}

impl<'a> CloudMapReadinessGateMutator<'a> {
    /// Create a readiness gate mutator for pods selected by `vn`
    pub fn new(vn: &'a VirtualNode) -> Self {
        Self { vn }
    }

    /// Append the gate unless the node uses DNS or the gate is already there
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if !self.vn.uses_cloud_map() {
            return Ok(());
        }
        let present = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.readiness_gates.as_ref())
            .is_some_and(|gates| {
                gates
                    .iter()
                    .any(|g| g.condition_type == annotations::CLOUDMAP_HEALTHY_CONDITION)
            });
        if present {
            return Ok(());
        }

        debug!(pod = %pod_name(pod), "adding cloud map readiness gate");
        spec_mut(pod)
            .readiness_gates
            .get_or_insert_with(Vec::new)
            .push(PodReadinessGate {
                condition_type: annotations::CLOUDMAP_HEALTHY_CONDITION.to_string(),
            });
        Ok(())
    }
}
