//! Image pull secret for the proxy images

use k8s_openapi::api::core::v1::{LocalObjectReference, Pod};
use tracing::debug;

use mesh_injector_common::Result;

use super::annotations;
use super::sidecar::{pod_name, spec_mut};

/// Appends `appmesh-ecr-secret` to the pod's image pull secrets
pub struct EcrSecretMutator {
    enabled: bool,
}

impl EcrSecretMutator {
    /// Create an ECR secret mutator
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Append the secret after any existing ones unless it is already listed
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let present = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.image_pull_secrets.as_ref())
            .is_some_and(|secrets| secrets.iter().any(|s| s.name == annotations::ECR_SECRET));
        if present {
            return Ok(());
        }

        debug!(pod = %pod_name(pod), "adding ecr pull secret");
        spec_mut(pod)
            .image_pull_secrets
            .get_or_insert_with(Vec::new)
            .push(LocalObjectReference {
                name: annotations::ECR_SECRET.to_string(),
            });
        Ok(())
    }
}
