//! Jaeger tracing through Envoy's Zipkin tracer

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::template::render_template;
use mesh_injector_common::Result;

use super::annotations;
use super::config::JaegerConfig;
use super::sidecar::{has_volume, pod_name};
use super::tracer_config::{append_tracer_init, collector_host};

const JAEGER_INIT_IMAGE: &str = "public.ecr.aws/docker/library/busybox";

const JAEGER_CONFIG_TEMPLATE: &str = r#"
tracing:
  http:
    name: envoy.tracers.zipkin
    typed_config:
      "@type": type.googleapis.com/envoy.config.trace.v3.ZipkinConfig
      collector_cluster: jaeger
      collector_endpoint: "/api/v2/spans"
      collector_endpoint_version: HTTP_JSON
      shared_span_context: false
static_resources:
  clusters:
  - name: jaeger
    connect_timeout: 1s
    type: STRICT_DNS
    lb_policy: ROUND_ROBIN
    load_assignment:
      cluster_name: jaeger
      endpoints:
      - lb_endpoints:
        - endpoint:
            address:
              socket_address:
                address: {{ address }}
                port_value: {{ port }}
"#;

#[derive(Serialize)]
struct JaegerVariables {
    address: String,
    port: u16,
}

/// Writes the Jaeger tracer config Envoy picks up at startup
pub struct JaegerMutator<'a> {
    config: &'a JaegerConfig,
}

impl<'a> JaegerMutator<'a> {
    /// Create a Jaeger mutator
    pub fn new(config: &'a JaegerConfig) -> Self {
        Self { config }
    }

    /// Append the config init container unless tracing config is already mounted
    pub fn mutate(&self, pod: &mut Pod) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if has_volume(pod, annotations::TRACING_CONFIG_VOLUME) {
            debug!(pod = %pod_name(pod), "tracing config already present");
            return Ok(());
        }

        let vars = JaegerVariables {
            address: collector_host(&self.config.address),
            port: self.config.port,
        };
        let envoy_config = render_template("jaeger", JAEGER_CONFIG_TEMPLATE, &vars)?;
        debug!(pod = %pod_name(pod), collector = %self.config.address, "injecting jaeger config");
        append_tracer_init(
            pod,
            annotations::JAEGER_INIT_CONTAINER,
            JAEGER_INIT_IMAGE,
            &envoy_config,
            &self.config.address,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::sidecar::has_init_container;
    use crate::inject::testing::app_pod;

    fn enabled() -> JaegerConfig {
        JaegerConfig {
            enabled: true,
            ..Default::default()
        }
    }

    fn script(pod: &Pod) -> String {
        pod.spec
            .as_ref()
            .and_then(|s| s.init_containers.as_ref())
            .and_then(|init| init.iter().find(|c| c.name == "inject-jaeger-config"))
            .and_then(|c| c.command.as_ref())
            .map(|command| command[2].clone())
            .expect("jaeger init container should be injected")
    }

    #[test]
    fn test_disabled_is_noop() {
        let mut pod = app_pod();
        let before = pod.clone();
        JaegerMutator::new(&JaegerConfig::default())
            .mutate(&mut pod)
            .expect("noop should succeed");
        assert_eq!(pod, before);
    }

    #[test]
    fn test_injects_zipkin_config() {
        let mut pod = app_pod();
        JaegerMutator::new(&enabled())
            .mutate(&mut pod)
            .expect("jaeger should inject");

        assert!(has_init_container(&pod, "inject-jaeger-config"));
        assert!(has_volume(&pod, "envoy-tracing-config"));
        let script = script(&pod);
        assert!(script.starts_with("cat <<EOF >> /tmp/envoy/envoyconf.yaml\ntracing:\n"));
        assert!(script.contains("name: envoy.tracers.zipkin"));
        assert!(script.contains("collector_endpoint_version: HTTP_JSON"));
        assert!(script.contains("address: appmesh-jaeger.appmesh-system\n"));
        assert!(script.contains("port_value: 9411\n"));

        let image = pod
            .spec
            .as_ref()
            .and_then(|s| s.init_containers.as_ref())
            .and_then(|init| init[0].image.clone());
        assert_eq!(image.as_deref(), Some(JAEGER_INIT_IMAGE));
    }

    #[test]
    fn test_existing_tracing_volume_is_noop() {
        let mut pod = app_pod();
        let config = enabled();
        let mutator = JaegerMutator::new(&config);
        mutator.mutate(&mut pod).expect("first apply should succeed");
        let once = pod.clone();
        mutator.mutate(&mut pod).expect("second apply should succeed");
        assert_eq!(pod, once);
    }
}
