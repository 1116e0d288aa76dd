//! Tracer bootstrap shared by Jaeger and Datadog
//!
//! Envoy reads its tracer from a YAML fragment on a shared emptyDir. A busybox
//! init container writes that fragment before Envoy starts; Envoy mounts the
//! same volume (see the Envoy mutator).

use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, Pod, Volume};
use serde::Serialize;

use mesh_injector_common::quantity::sidecar_resources;
use mesh_injector_common::Result;

use super::annotations;
use super::envoy::TRACING_CONFIG_FILE;
use super::sidecar::{is_host_ip_ref, render_container, spec_mut};

/// Shell variable the init container resolves the node IP into
const HOST_IP_VAR: &str = "HOST_IP";

const TRACER_INIT_TEMPLATE: &str = r#"{
  "name": {{ name|tojson }},
  "image": {{ image|tojson }},
  "imagePullPolicy": "IfNotPresent",
  "command": ["sh", "-c", {{ script|tojson }}],
  {%- if host_ip %}
  "env": [
    {"name": {{ host_ip_var|tojson }}, "valueFrom": {"fieldRef": {"fieldPath": "status.hostIP"}}}
  ],
  {%- endif %}
  "volumeMounts": [
    {"name": {{ volume|tojson }}, "mountPath": {{ mount_path|tojson }}}
  ]
}"#;

#[derive(Serialize)]
struct TracerInitVariables<'a> {
    name: &'a str,
    image: &'a str,
    script: String,
    host_ip: bool,
    host_ip_var: &'a str,
    volume: &'a str,
    mount_path: &'a str,
}

/// Collector host as written into the tracer YAML
///
/// A node-local collector is resolved by the init container's shell, since the
/// heredoc that writes the file expands variables.
pub fn collector_host(address: &str) -> String {
    if is_host_ip_ref(address) {
        format!("${{{}}}", HOST_IP_VAR)
    } else {
        address.to_string()
    }
}

/// Append the init container writing `envoy_config` and the shared volume
pub fn append_tracer_init(
    pod: &mut Pod,
    name: &str,
    image: &str,
    envoy_config: &str,
    address: &str,
) -> Result<()> {
    let vars = TracerInitVariables {
        name,
        image,
        script: format!(
            "cat <<EOF >> {file}\n{config}EOF\n\ncat {file}\n",
            file = TRACING_CONFIG_FILE,
            config = envoy_config.trim_start_matches('\n')
        ),
        host_ip: is_host_ip_ref(address),
        host_ip_var: HOST_IP_VAR,
        volume: annotations::TRACING_CONFIG_VOLUME,
        mount_path: annotations::TRACING_CONFIG_MOUNT_PATH,
    };
    let mut container = render_container(name, TRACER_INIT_TEMPLATE, &vars)?;
    container.resources = Some(sidecar_resources(
        Some("10m"),
        Some("32Mi"),
        Some("100m"),
        Some("64Mi"),
    )?);

    let spec = spec_mut(pod);
    spec.init_containers
        .get_or_insert_with(Vec::new)
        .push(container);
    spec.volumes.get_or_insert_with(Vec::new).push(Volume {
        name: annotations::TRACING_CONFIG_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::sidecar::{has_init_container, has_volume, HOST_IP_REF};
    use crate::inject::testing::app_pod;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_collector_host() {
        assert_eq!(collector_host("jaeger.tracing"), "jaeger.tracing");
        assert_eq!(collector_host(HOST_IP_REF), "${HOST_IP}");
    }

    #[test]
    fn test_init_container_writes_config() {
        let mut pod = app_pod();
        append_tracer_init(&mut pod, "inject-test-config", "busybox", "tracing: {}\n", "collector")
            .expect("init container should render");

        assert!(has_init_container(&pod, "inject-test-config"));
        assert!(has_volume(&pod, "envoy-tracing-config"));

        let inits = pod
            .spec
            .as_ref()
            .and_then(|s| s.init_containers.clone())
            .expect("init containers should be set");
        let init = &inits[0];
        let command = init.command.clone().expect("command should be set");
        assert_eq!(command[0], "sh");
        assert_eq!(
            command[2],
            "cat <<EOF >> /tmp/envoy/envoyconf.yaml\ntracing: {}\nEOF\n\ncat /tmp/envoy/envoyconf.yaml\n"
        );
        assert_eq!(init.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert!(init.env.is_none());

        let mounts = init.volume_mounts.clone().expect("mount should be set");
        assert_eq!(mounts[0].mount_path, "/tmp/envoy");

        let resources = init.resources.clone().expect("resources should be set");
        let limits = resources.limits.expect("limits should be set");
        assert_eq!(limits["cpu"], Quantity("100m".to_string()));
        assert_eq!(limits["memory"], Quantity("64Mi".to_string()));
        let requests = resources.requests.expect("requests should be set");
        assert_eq!(requests["cpu"], Quantity("10m".to_string()));
        assert_eq!(requests["memory"], Quantity("32Mi".to_string()));
    }

    #[test]
    fn test_leading_newline_not_doubled() {
        let mut pod = app_pod();
        append_tracer_init(&mut pod, "inject-test-config", "busybox", "\ntracing: {}\n", "collector")
            .expect("init container should render");

        let inits = pod
            .spec
            .as_ref()
            .and_then(|s| s.init_containers.clone())
            .expect("init containers should be set");
        let command = inits[0].command.clone().expect("command should be set");
        assert!(command[2].starts_with("cat <<EOF >> /tmp/envoy/envoyconf.yaml\ntracing: {}\nEOF\n"));
    }

    #[test]
    fn test_host_ip_env_for_node_local_collector() {
        let mut pod = app_pod();
        append_tracer_init(&mut pod, "inject-test-config", "busybox", "x: 1\n", HOST_IP_REF)
            .expect("init container should render");

        let inits = pod
            .spec
            .as_ref()
            .and_then(|s| s.init_containers.clone())
            .expect("init containers should be set");
        let init = &inits[0];
        let env = init.env.clone().expect("env should be set");
        assert_eq!(env[0].name, "HOST_IP");
        assert_eq!(
            env[0]
                .value_from
                .as_ref()
                .and_then(|s| s.field_ref.as_ref())
                .map(|f| f.field_path.as_str()),
            Some("status.hostIP")
        );
    }
}
