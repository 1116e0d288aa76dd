//! Pod access helpers shared by the mutators
//!
//! Mutators identify what they injected by name, so most of this module is
//! lookup by name plus the render-then-decode step every templated container
//! goes through.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ExecAction, HostPathVolumeSource, Pod, PodSpec, Probe, ResourceRequirements,
    Volume, VolumeMount,
};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use mesh_injector_common::quantity::sidecar_resources;
use mesh_injector_common::template::render_template;
use mesh_injector_common::{Error, Result};

use super::annotations;
use super::config::{EnvoyConfig, SidecarConfig};

/// UID the proxy and its companions run as; interception skips its traffic
pub const PROXY_UID: i64 = 1337;

/// Address value that selects the node's IP through the downward API
pub const HOST_IP_REF: &str = "ref:status.hostIP";

/// Pod spec, created empty when the pod has none
pub fn spec_mut(pod: &mut Pod) -> &mut PodSpec {
    pod.spec.get_or_insert_with(PodSpec::default)
}

/// Annotation value by key
pub fn annotation<'a>(pod: &'a Pod, key: &str) -> Option<&'a str> {
    pod.annotations().get(key).map(String::as_str)
}

/// Toggle annotation: `Some(true)` when "enabled" in any case, `None` when absent
pub fn annotation_enabled(pod: &Pod, key: &str) -> Option<bool> {
    annotation(pod, key).map(|value| value.eq_ignore_ascii_case(annotations::ENABLED))
}

/// Whether a regular container with `name` exists
pub fn has_container(pod: &Pod, name: &str) -> bool {
    pod.spec
        .as_ref()
        .is_some_and(|spec| spec.containers.iter().any(|c| c.name == name))
}

/// Whether an init container with `name` exists
pub fn has_init_container(pod: &Pod, name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.init_containers.as_ref())
        .is_some_and(|init| init.iter().any(|c| c.name == name))
}

/// Whether a volume with `name` exists
pub fn has_volume(pod: &Pod, name: &str) -> bool {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .is_some_and(|volumes| volumes.iter().any(|v| v.name == name))
}

/// Log-friendly pod name; pods created by controllers often only have `generateName`
pub fn pod_name(pod: &Pod) -> String {
    pod.name_any()
}

/// Render `text` and decode the result as `T`
pub fn render_as<T, V>(name: &str, text: &str, vars: &V) -> Result<T>
where
    T: DeserializeOwned,
    V: Serialize,
{
    let rendered = render_template(name, text, vars)?;
    serde_json::from_str(&rendered).map_err(|e| Error::decode(name, e))
}

/// Render a container template
pub fn render_container<V: Serialize>(name: &str, text: &str, vars: &V) -> Result<Container> {
    render_as(name, text, vars)
}

/// Sidecar resources: configured sizing, each field overridable by annotation
pub fn resources_for(pod: &Pod, sizing: &SidecarConfig) -> Result<ResourceRequirements> {
    sidecar_resources(
        annotation(pod, annotations::CPU_REQUEST).or(sizing.cpu_requests.as_deref()),
        annotation(pod, annotations::MEMORY_REQUEST).or(sizing.memory_requests.as_deref()),
        annotation(pod, annotations::CPU_LIMIT).or(sizing.cpu_limits.as_deref()),
        annotation(pod, annotations::MEMORY_LIMIT).or(sizing.memory_limits.as_deref()),
    )
}

/// Readiness probe asking the Envoy admin interface whether the server is LIVE
pub fn envoy_readiness_probe(admin_port: u16, initial_delay: i32, period: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "curl -s http://localhost:{}/server_info | grep state | grep -q LIVE",
                    admin_port
                ),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(1),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

/// Whether an address setting asks for the node's IP
pub fn is_host_ip_ref(address: &str) -> bool {
    address == HOST_IP_REF
}

/// `key<sep>value` entries of a comma-separated annotation, keyed by `key`
///
/// A repeated key keeps its last value. Any entry that does not split into
/// exactly two parts fails with `format` as the expected shape.
pub fn annotation_pairs(
    pod: &Pod,
    key: &str,
    sep: char,
    format: &str,
) -> Result<BTreeMap<String, String>> {
    let Some(raw) = annotation(pod, key) else {
        return Ok(BTreeMap::new());
    };
    let mut pairs = BTreeMap::new();
    for entry in raw.split(',') {
        let parts: Vec<&str> = entry.split(sep).map(str::trim).collect();
        let [name, value] = parts.as_slice() else {
            return Err(Error::malformed_annotation(key, format));
        };
        pairs.insert(name.to_string(), value.to_string());
    }
    Ok(pairs)
}

/// Whether Envoy should talk to a node-local SDS agent for this pod
pub fn sds_enabled(pod: &Pod, envoy: &EnvoyConfig) -> bool {
    envoy.enable_sds
        && !annotation(pod, annotations::SDS)
            .is_some_and(|v| v.eq_ignore_ascii_case(annotations::DISABLED))
}

/// Host socket volume and Envoy mount for the SDS agent
///
/// `None` when the pod already mounts `uds_path` from the host.
pub fn sds_socket_volume(pod: &Pod, uds_path: &str) -> Option<(Volume, VolumeMount)> {
    let present = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.volumes.as_ref())
        .is_some_and(|volumes| {
            volumes
                .iter()
                .any(|v| v.host_path.as_ref().is_some_and(|h| h.path == uds_path))
        });
    if present {
        return None;
    }
    let volume = Volume {
        name: annotations::SDS_SOCKET_VOLUME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: uds_path.to_string(),
            type_: Some("Socket".to_string()),
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: annotations::SDS_SOCKET_VOLUME.to_string(),
        mount_path: uds_path.to_string(),
        ..Default::default()
    };
    Some((volume, mount))
}
