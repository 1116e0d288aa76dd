//! Envoy configuration for virtual gateway pods
//!
//! Gateway deployments declare their own `envoy` container with a placeholder
//! image. The injector swaps in the configured image and fills the control
//! plane env vars, leaving everything else the deployment declared untouched.
//! Deployments that pin their own image opt out of the swap with
//! [`annotations::VIRTUAL_GATEWAY_SKIP_IMAGE_OVERRIDE`].

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, Pod};
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::mesh::{Mesh, VirtualGateway};
use mesh_injector_common::{Error, Result};

use super::annotations;
use super::config::{ClusterIdentity, EnvoyConfig, SidecarConfig};
use super::sidecar::{
    annotation_enabled, pod_name, render_as, sds_enabled, sds_socket_volume, spec_mut,
};

/// Image placeholder gateway deployments use for their envoy container
pub const ENVOY_IMAGE_PLACEHOLDER: &str = "injector-envoy-image";

const GATEWAY_ENV_TEMPLATE: &str = r#"{
  "APPMESH_VIRTUAL_NODE_NAME": {{ virtual_gateway_name|tojson }},
  "APPMESH_PREVIEW": {{ preview|flag|tojson }},
  "ENVOY_LOG_LEVEL": {{ log_level|tojson }},
  "AWS_REGION": {{ aws_region|tojson }}
  {%- if sds_uds_path %},
  "APPMESH_SDS_SOCKET_PATH": {{ sds_uds_path|tojson }}
  {%- endif %}
}"#;

#[derive(Serialize)]
struct GatewayEnvVariables<'a> {
    virtual_gateway_name: String,
    preview: bool,
    log_level: &'a str,
    aws_region: &'a str,
    sds_uds_path: Option<&'a str>,
}

/// Configures the envoy container declared by a gateway deployment
pub struct VirtualGatewayEnvoyMutator<'a> {
    sidecar: &'a SidecarConfig,
    envoy: &'a EnvoyConfig,
    identity: &'a ClusterIdentity,
    mesh: &'a Mesh,
    vg: &'a VirtualGateway,
}

impl<'a> VirtualGatewayEnvoyMutator<'a> {
    /// Create a gateway mutator for pods selected by `vg`
    pub fn new(
        sidecar: &'a SidecarConfig,
        envoy: &'a EnvoyConfig,
        identity: &'a ClusterIdentity,
        mesh: &'a Mesh,
        vg: &'a VirtualGateway,
    ) -> Self {
        Self {
            sidecar,
            envoy,
            identity,
            mesh,
            vg,
        }
    }

    /// Set the image and control plane env on the declared envoy container
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        let sds = sds_enabled(pod, self.envoy);
        let vars = GatewayEnvVariables {
            virtual_gateway_name: format!(
                "mesh/{}/virtualGateway/{}",
                self.mesh.augmented_name(&self.identity.account_id),
                self.vg.resolved_aws_name()
            ),
            preview: annotation_enabled(pod, annotations::PREVIEW).unwrap_or(self.envoy.preview),
            log_level: &self.envoy.log_level,
            aws_region: &self.identity.aws_region,
            sds_uds_path: sds.then_some(self.envoy.sds_uds_path.as_str()),
        };
        let env: BTreeMap<String, String> =
            render_as("virtualGatewayEnvoy", GATEWAY_ENV_TEMPLATE, &vars)?;

        let name = pod_name(pod);
        let skip_image_override =
            annotation_enabled(pod, annotations::VIRTUAL_GATEWAY_SKIP_IMAGE_OVERRIDE)
                .unwrap_or(false);
        let socket = sds
            .then(|| sds_socket_volume(pod, &self.envoy.sds_uds_path))
            .flatten();
        let Some(container) = pod.spec.as_mut().and_then(|spec| {
            spec.containers
                .iter_mut()
                .find(|c| c.name == annotations::ENVOY_CONTAINER)
        }) else {
            debug!(pod = %name, "no envoy container declared, skipping gateway injection");
            return Ok(());
        };

        if !skip_image_override {
            let image = container.image.as_deref().unwrap_or_default();
            if image != ENVOY_IMAGE_PLACEHOLDER && image != self.sidecar.image {
                return Err(Error::invalid_config(format!(
                    "invalid envoy image name for injection {}, expected name: {}",
                    image, ENVOY_IMAGE_PLACEHOLDER
                )));
            }
            container.image = Some(self.sidecar.image.clone());
        }

        let existing = container.env.get_or_insert_with(Vec::new);
        let mut missing = env;
        for var in existing.iter_mut() {
            if let Some(value) = missing.remove(&var.name) {
                var.value = Some(value);
                var.value_from = None;
            }
        }
        existing.extend(missing.into_iter().map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            value_from: None,
        }));

        let volume = socket.map(|(volume, mount)| {
            container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
            volume
        });
        if let Some(volume) = volume {
            spec_mut(pod).volumes.get_or_insert_with(Vec::new).push(volume);
        }

        debug!(pod = %name, skip_image_override, sds, "configured gateway envoy");
        Ok(())
    }
}
