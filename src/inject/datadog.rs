//! Datadog tracing through Envoy's Datadog tracer

use k8s_openapi::api::core::v1::Pod;
use serde::Serialize;
use tracing::debug;

use mesh_injector_common::template::render_template;
use mesh_injector_common::Result;

use super::annotations;
use super::config::DatadogConfig;
use super::sidecar::{has_volume, pod_name};
use super::tracer_config::{append_tracer_init, collector_host};

const DATADOG_INIT_IMAGE: &str = "busybox";

const DATADOG_CONFIG_TEMPLATE: &str = r#"
tracing:
  http:
    name: envoy.tracers.datadog
    typed_config:
      "@type": type.googleapis.com/envoy.config.trace.v3.DatadogConfig
      collector_cluster: datadog_agent
      service_name: envoy
static_resources:
  clusters:
  - name: datadog_agent
    connect_timeout: 1s
    type: STRICT_DNS
    lb_policy: ROUND_ROBIN
    load_assignment:
      cluster_name: datadog_agent
      endpoints:
      - lb_endpoints:
        - endpoint:
            address:
              socket_address:
                address: {{ address }}
                port_value: {{ port }}
"#;

#[derive(Serialize)]
struct DatadogVariables {
    address: String,
    port: u16,
}

/// Writes the Datadog tracer config Envoy picks up at startup
pub struct DatadogMutator<'a> {
    config: &'a DatadogConfig,
}

impl<'a> DatadogMutator<'a> {
    /// Create a Datadog mutator
    pub fn new(config: &'a DatadogConfig) -> Self {
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

        let vars = DatadogVariables {
            address: collector_host(&self.config.address),
            port: self.config.port,
        };
        let envoy_config = render_template("datadog", DATADOG_CONFIG_TEMPLATE, &vars)?;
        debug!(pod = %pod_name(pod), agent = %self.config.address, "injecting datadog config");
        append_tracer_init(
            pod,
            annotations::DATADOG_INIT_CONTAINER,
            DATADOG_INIT_IMAGE,
            &envoy_config,
            &self.config.address,
        )
    }
}
