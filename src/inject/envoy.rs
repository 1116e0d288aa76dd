//! Envoy sidecar for virtual node pods
//!
//! The container definition is rendered from [`ENVOY_TEMPLATE`]; sizing, the
//! readiness probe, pod-supplied env and mounts are attached afterwards since
//! they depend on annotations that are validated in Rust rather than in the
//! template.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvVar, Pod, SecretVolumeSource, Volume, VolumeMount,
};
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::mesh::{Mesh, VirtualNode};
use mesh_injector_common::{Error, Result};

use super::annotations;
use super::config::{
    ClusterIdentity, EnvoyConfig, InjectConfig, SidecarConfig, StatsConfig, TracingConfig,
};
use super::sidecar::{
    annotation_enabled, annotation_pairs, envoy_readiness_probe, has_container, is_host_ip_ref,
    pod_name, render_container, resources_for, sds_enabled, sds_socket_volume, spec_mut,
    PROXY_UID,
};

/// File the tracing init containers write and Envoy reads
pub const TRACING_CONFIG_FILE: &str = "/tmp/envoy/envoyconf.yaml";

const SECRET_MOUNT_FORMAT: &str = "secretName:mountPath";
const VOLUME_MOUNT_FORMAT: &str = "volumeName:mountPath";
const SIDECAR_ENV_FORMAT: &str = "EnvVariableKey=EnvVariableValue";

/// Pod-supplied env vars are placed after this one
const CUSTOM_ENV_ANCHOR: &str = "ENVOY_ADMIN_ACCESS_PORT";

const ENVOY_TEMPLATE: &str = r#"{
  "name": {{ name|tojson }},
  "image": {{ image|tojson }},
  "securityContext": {"runAsUser": {{ proxy_uid }}},
  "ports": [
    {"name": "stats", "containerPort": {{ admin_access_port }}, "protocol": "TCP"}
  ],
  "lifecycle": {
    "preStop": {"exec": {"command": ["sh", "-c", {{ pre_stop_command|tojson }}]}}
  },
  {%- if tracing_config %}
  "volumeMounts": [
    {"name": {{ tracing_volume|tojson }}, "mountPath": {{ tracing_mount_path|tojson }}}
  ],
  {%- endif %}
  "env": [
    {"name": "APPMESH_VIRTUAL_NODE_NAME", "value": {{ virtual_node_name|tojson }}},
    {"name": "APPMESH_PREVIEW", "value": {{ preview|flag|tojson }}},
    {"name": "ENVOY_LOG_LEVEL", "value": {{ log_level|tojson }}},
    {"name": "ENVOY_ADMIN_ACCESS_PORT", "value": {{ admin_access_port|string|tojson }}},
    {%- if admin_access_log_file %}
    {"name": "ENVOY_ADMIN_ACCESS_LOG_FILE", "value": {{ admin_access_log_file|tojson }}},
    {%- endif %}
    {%- if tracing_config %}
    {"name": "ENVOY_TRACING_CFG_FILE", "value": {{ tracing_config_file|tojson }}},
    {%- endif %}
    {"name": "AWS_REGION", "value": {{ aws_region|tojson }}},
    {%- if sds_uds_path %}
    {"name": "APPMESH_SDS_SOCKET_PATH", "value": {{ sds_uds_path|tojson }}},
    {%- endif %}
    {%- if controller_version %}
    {"name": "APPMESH_PLATFORM_APP_MESH_CONTROLLER_VERSION", "value": {{ controller_version|tojson }}},
    {%- endif %}
    {%- if k8s_version %}
    {"name": "APPMESH_PLATFORM_K8S_VERSION", "value": {{ k8s_version|tojson }}},
    {%- endif %}
    {"name": "APPMESH_DUALSTACK_ENDPOINT", "value": {{ dual_stack_endpoint|flag|tojson }}},
    {"name": "ENVOY_ADMIN_ACCESS_ENABLE_IPV6", "value": {% if admin_access_enable_ipv6 %}"true"{% else %}"false"{% endif %}},
    {"name": "APPMESH_FIPS_ENDPOINT", "value": {{ fips_endpoint|flag|tojson }}},
    {%- if xray %}
    {"name": "ENABLE_ENVOY_XRAY_TRACING", "value": "1"},
    {"name": "XRAY_DAEMON_PORT", "value": {{ xray_daemon_port|string|tojson }}},
    {%- if xray_sampling_rate %}
    {"name": "XRAY_SAMPLING_RATE", "value": {{ xray_sampling_rate|tojson }}},
    {%- endif %}
    {%- endif %}
    {%- if datadog %}
    {"name": "ENABLE_ENVOY_DATADOG_TRACING", "value": "1"},
    {"name": "DATADOG_TRACER_PORT", "value": {{ datadog_port|string|tojson }}},
    {%- if datadog_address_from_host %}
    {"name": "DATADOG_TRACER_ADDRESS", "valueFrom": {"fieldRef": {"fieldPath": "status.hostIP"}}},
    {%- else %}
    {"name": "DATADOG_TRACER_ADDRESS", "value": {{ datadog_address|tojson }}},
    {%- endif %}
    {%- endif %}
    {%- if stats_tags %}
    {"name": "ENABLE_ENVOY_STATS_TAGS", "value": "1"},
    {%- endif %}
    {%- if statsd %}
    {"name": "ENABLE_ENVOY_DOG_STATSD", "value": "1"},
    {"name": "STATSD_PORT", "value": {{ statsd_port|string|tojson }}},
    {%- if statsd_address_from_host %}
    {"name": "STATSD_ADDRESS", "valueFrom": {"fieldRef": {"fieldPath": "status.hostIP"}}},
    {%- else %}
    {"name": "STATSD_ADDRESS", "value": {{ statsd_address|tojson }}},
    {%- endif %}
    {%- if statsd_socket_path %}
    {"name": "STATSD_SOCKET_PATH", "value": {{ statsd_socket_path|tojson }}},
    {%- endif %}
    {%- endif %}
    {"name": "APPMESH_PLATFORM_K8S_POD_UID", "valueFrom": {"fieldRef": {"fieldPath": "metadata.uid"}}}
  ]
}"#;

#[derive(Serialize)]
struct EnvoyVariables<'a> {
    name: &'a str,
    image: &'a str,
    proxy_uid: i64,
    admin_access_port: u16,
    admin_access_log_file: Option<&'a str>,
    admin_access_enable_ipv6: bool,
    pre_stop_command: String,
    virtual_node_name: String,
    preview: bool,
    log_level: &'a str,
    aws_region: &'a str,
    sds_uds_path: Option<&'a str>,
    controller_version: Option<&'a str>,
    k8s_version: Option<&'a str>,
    dual_stack_endpoint: bool,
    fips_endpoint: bool,
    tracing_config: bool,
    tracing_config_file: &'a str,
    tracing_volume: &'a str,
    tracing_mount_path: &'a str,
    xray: bool,
    xray_daemon_port: u16,
    xray_sampling_rate: Option<&'a str>,
    datadog: bool,
    datadog_port: u16,
    datadog_address: &'a str,
    datadog_address_from_host: bool,
    stats_tags: bool,
    statsd: bool,
    statsd_port: u16,
    statsd_address: &'a str,
    statsd_address_from_host: bool,
    statsd_socket_path: Option<&'a str>,
}

/// Injects the Envoy sidecar
pub struct EnvoyMutator<'a> {
    sidecar: &'a SidecarConfig,
    envoy: &'a EnvoyConfig,
    tracing: &'a TracingConfig,
    stats: &'a StatsConfig,
    identity: &'a ClusterIdentity,
    mesh: &'a Mesh,
    vn: &'a VirtualNode,
}

impl<'a> EnvoyMutator<'a> {
    /// Create an Envoy mutator for pods selected by `vn`
    pub fn new(
        config: &'a InjectConfig,
        identity: &'a ClusterIdentity,
        mesh: &'a Mesh,
        vn: &'a VirtualNode,
    ) -> Self {
        Self {
            sidecar: &config.sidecar,
            envoy: &config.envoy,
            tracing: &config.tracing,
            stats: &config.stats,
            identity,
            mesh,
            vn,
        }
    }

    /// Append the Envoy container and its volumes unless Envoy is already there
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if has_container(pod, annotations::ENVOY_CONTAINER) {
            debug!(pod = %pod_name(pod), "envoy already present");
            return Ok(());
        }

        let secrets = annotation_pairs(pod, annotations::SECRET_MOUNTS, ':', SECRET_MOUNT_FORMAT)?;
        let pod_volumes =
            annotation_pairs(pod, annotations::VOLUME_MOUNTS, ':', VOLUME_MOUNT_FORMAT)?;
        let custom_env = annotation_pairs(pod, annotations::SIDECAR_ENV, '=', SIDECAR_ENV_FORMAT)?;
        let sds = sds_enabled(pod, self.envoy);
        if self.tracing.xray.enabled {
            if let Some(rate) = self.tracing.xray.sampling_rate.as_deref() {
                validate_sampling_rate(rate)?;
            }
        }

        let vars = EnvoyVariables {
            name: annotations::ENVOY_CONTAINER,
            image: &self.sidecar.image,
            proxy_uid: PROXY_UID,
            admin_access_port: self.envoy.admin_access_port,
            admin_access_log_file: self.envoy.admin_access_log_file.as_deref(),
            admin_access_enable_ipv6: self.envoy.admin_access_enable_ipv6,
            pre_stop_command: format!("sleep {}", self.envoy.pre_stop_delay),
            virtual_node_name: format!(
                "mesh/{}/virtualNode/{}",
                self.mesh.augmented_name(&self.identity.account_id),
                self.vn.resolved_aws_name()
            ),
            preview: annotation_enabled(pod, annotations::PREVIEW).unwrap_or(self.envoy.preview),
            log_level: &self.envoy.log_level,
            aws_region: &self.identity.aws_region,
            sds_uds_path: sds.then_some(self.envoy.sds_uds_path.as_str()),
            controller_version: self.identity.controller_version.as_deref(),
            k8s_version: self.identity.k8s_version.as_deref(),
            dual_stack_endpoint: self.envoy.dual_stack_endpoint,
            fips_endpoint: self.envoy.fips_endpoint,
            tracing_config: self.tracing.jaeger.enabled || self.tracing.datadog.enabled,
            tracing_config_file: TRACING_CONFIG_FILE,
            tracing_volume: annotations::TRACING_CONFIG_VOLUME,
            tracing_mount_path: annotations::TRACING_CONFIG_MOUNT_PATH,
            xray: self.tracing.xray.enabled,
            xray_daemon_port: self.tracing.xray.daemon_port,
            xray_sampling_rate: self.tracing.xray.sampling_rate.as_deref(),
            datadog: self.tracing.datadog.enabled,
            datadog_port: self.tracing.datadog.port,
            datadog_address: &self.tracing.datadog.address,
            datadog_address_from_host: is_host_ip_ref(&self.tracing.datadog.address),
            stats_tags: self.stats.enable_stats_tags,
            statsd: self.stats.enable_statsd,
            statsd_port: self.stats.statsd_port,
            statsd_address: &self.stats.statsd_address,
            statsd_address_from_host: is_host_ip_ref(&self.stats.statsd_address),
            statsd_socket_path: self.stats.statsd_socket_path.as_deref(),
        };
        let mut container = render_container("envoy", ENVOY_TEMPLATE, &vars)?;
        merge_custom_env(&mut container, custom_env);
        container.resources = Some(resources_for(pod, self.sidecar)?);
        container.readiness_probe = Some(envoy_readiness_probe(
            self.envoy.admin_access_port,
            self.envoy.readiness_probe_initial_delay,
            self.envoy.readiness_probe_period,
        ));

        let mut volumes = Vec::with_capacity(secrets.len() + 1);
        let mut mounts = Vec::with_capacity(secrets.len() + pod_volumes.len() + 1);
        for (secret, path) in secrets {
            mounts.push(read_only_mount(&secret, path));
            volumes.push(Volume {
                name: secret.clone(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        for (volume, path) in pod_volumes {
            mounts.push(read_only_mount(&volume, path));
        }
        if sds {
            if let Some((volume, mount)) = sds_socket_volume(pod, &self.envoy.sds_uds_path) {
                mounts.push(mount);
                volumes.push(volume);
            }
        }
        if !mounts.is_empty() {
            container
                .volume_mounts
                .get_or_insert_with(Vec::new)
                .extend(mounts);
        }

        debug!(
            pod = %pod_name(pod),
            volumes = volumes.len(),
            sds,
            "injecting envoy"
        );
        let spec = spec_mut(pod);
        spec.containers.push(container);
        if !volumes.is_empty() {
            spec.volumes.get_or_insert_with(Vec::new).extend(volumes);
        }
        Ok(())
    }
}

fn read_only_mount(volume: &str, path: String) -> VolumeMount {
    VolumeMount {
        name: volume.to_string(),
        mount_path: path,
        read_only: Some(true),
        ..Default::default()
    }
}

/// Insert pod-supplied env vars after the admin port; rendered vars keep their values
fn merge_custom_env(container: &mut Container, custom: BTreeMap<String, String>) {
    if custom.is_empty() {
        return;
    }
    let env = container.env.get_or_insert_with(Vec::new);
    let extra: Vec<EnvVar> = custom
        .into_iter()
        .filter(|(name, _)| !env.iter().any(|e| &e.name == name))
        .map(|(name, value)| EnvVar {
            name,
            value: Some(value),
            value_from: None,
        })
        .collect();
    let at = env
        .iter()
        .position(|e| e.name == CUSTOM_ENV_ANCHOR)
        .map_or(env.len(), |i| i + 1);
    env.splice(at..at, extra);
}

/// X-Ray sampling rate must be a decimal fraction
fn validate_sampling_rate(rate: &str) -> Result<()> {
    let detail = match rate.trim().parse::<f64>() {
        Ok(value) if (0.0..=1.0).contains(&value) => return Ok(()),
        Ok(_) => "out of range".to_string(),
        Err(e) => e.to_string(),
    };
    Err(Error::invalid_config(format!(
        "tracing.samplingRate should be a decimal between 0 & 1.00, but instead got {} {}",
        rate, detail
    )))
}
