//! Injector configuration
//!
//! [`InjectConfig`] is loaded once per process (YAML, camelCase keys, every
//! field optional) and validated before the first pod is processed. Each
//! mutator only ever sees the slice of it that concerns it; per-pod annotation
//! overrides are resolved inside the mutators.

use serde::{Deserialize, Serialize};

use mesh_injector_common::{Error, Result};

/// Process-wide injector settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct InjectConfig {
    /// Inject pods that carry no sidecar-inject annotation
    pub inject_default: bool,
    /// Set fsGroup 1337 on pods without one so projected tokens stay readable
    pub enable_iam_for_service_accounts: bool,
    /// Add the `appmesh-ecr-secret` image pull secret
    pub enable_ecr_secret: bool,
    /// Image and sizing shared by injected sidecars
    pub sidecar: SidecarConfig,
    /// Envoy runtime settings
    pub envoy: EnvoyConfig,
    /// Traffic interception init container
    pub proxy_init: ProxyInitConfig,
    /// Tracing backends
    pub tracing: TracingConfig,
    /// Stats emission
    pub stats: StatsConfig,
}

/// Image and default sizing for injected sidecars
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SidecarConfig {
    /// Envoy image
    pub image: String,
    /// Default CPU request
    pub cpu_requests: Option<String>,
    /// Default memory request
    pub memory_requests: Option<String>,
    /// Default CPU limit
    pub cpu_limits: Option<String>,
    /// Default memory limit
    pub memory_limits: Option<String>,
}

/// Envoy runtime settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvoyConfig {
    /// Connect to the preview channel of the control plane
    pub preview: bool,
    /// Envoy log level
    pub log_level: String,
    /// Admin interface port
    pub admin_access_port: u16,
    /// Admin access log path
    pub admin_access_log_file: Option<String>,
    /// Bind the admin interface on IPv6 as well
    pub admin_access_enable_ipv6: bool,
    /// Seconds Envoy keeps serving after the pod is asked to stop
    pub pre_stop_delay: u32,
    /// Seconds before the first readiness probe
    pub readiness_probe_initial_delay: i32,
    /// Seconds between readiness probes
    pub readiness_probe_period: i32,
    /// Use dual-stack control plane endpoints
    pub dual_stack_endpoint: bool,
    /// Use FIPS control plane endpoints
    pub fips_endpoint: bool,
    /// Fetch certificates from a node-local SDS agent
    pub enable_sds: bool,
    /// Unix socket of the SDS agent on the node
    pub sds_uds_path: String,
}

/// Traffic interception init container settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyInitConfig {
    /// proxy-route-manager image
    pub image: String,
    /// Comma-separated IPs never intercepted on egress
    pub ignored_ips: String,
    /// Install IPv6 interception rules unless a pod opts out
    pub enable_ipv6: bool,
}

/// Tracing backends; at most one may be enabled
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TracingConfig {
    /// AWS X-Ray daemon sidecar
    pub xray: XrayConfig,
    /// Jaeger collector
    pub jaeger: JaegerConfig,
    /// Datadog agent
    pub datadog: DatadogConfig,
}

/// X-Ray daemon settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct XrayConfig {
    /// Inject the daemon and enable Envoy X-Ray tracing
    pub enabled: bool,
    /// Daemon image
    pub image: String,
    /// UDP port the daemon listens on
    pub daemon_port: u16,
    /// Fraction of requests sampled, between 0 and 1
    pub sampling_rate: Option<String>,
    /// Daemon log level
    pub log_level: String,
    /// Role the daemon assumes to upload segments
    pub role_arn: Option<String>,
}

/// Jaeger collector settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct JaegerConfig {
    /// Enable Envoy Jaeger (Zipkin protocol) tracing
    pub enabled: bool,
    /// Collector host
    pub address: String,
    /// Collector port
    pub port: u16,
}

/// Datadog agent settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DatadogConfig {
    /// Enable Envoy Datadog tracing
    pub enabled: bool,
    /// Agent host, or `ref:status.hostIP` for a node-local agent
    pub address: String,
    /// Agent trace port
    pub port: u16,
}

/// Stats settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsConfig {
    /// Tag Envoy stats with mesh and node names
    pub enable_stats_tags: bool,
    /// Emit DogStatsD metrics
    pub enable_statsd: bool,
    /// DogStatsD port
    pub statsd_port: u16,
    /// DogStatsD host, or `ref:status.hostIP`
    pub statsd_address: String,
    /// DogStatsD unix socket
    pub statsd_socket_path: Option<String>,
}

/// Facts about the cluster the injector runs in
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusterIdentity {
    /// Account the controller runs under
    pub account_id: String,
    /// Region of the control plane
    pub aws_region: String,
    /// Controller version reported to the control plane
    pub controller_version: Option<String>,
    /// Kubernetes version reported to the control plane
    pub k8s_version: Option<String>,
}

impl Default for InjectConfig {
    fn default() -> Self {
        Self {
            inject_default: true,
            enable_iam_for_service_accounts: true,
            enable_ecr_secret: false,
            sidecar: SidecarConfig::default(),
            envoy: EnvoyConfig::default(),
            proxy_init: ProxyInitConfig::default(),
            tracing: TracingConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            image: "840364872350.dkr.ecr.us-west-2.amazonaws.com/aws-appmesh-envoy:v1.29.6.1-prod"
                .to_string(),
            cpu_requests: Some("10m".to_string()),
            memory_requests: Some("32Mi".to_string()),
            cpu_limits: None,
            memory_limits: None,
        }
    }
}

impl Default for EnvoyConfig {
    fn default() -> Self {
        Self {
            preview: false,
            log_level: "info".to_string(),
            admin_access_port: 9901,
            admin_access_log_file: Some("/tmp/envoy_admin_access.log".to_string()),
            admin_access_enable_ipv6: false,
            pre_stop_delay: 20,
            readiness_probe_initial_delay: 1,
            readiness_probe_period: 10,
            dual_stack_endpoint: false,
            fips_endpoint: false,
            enable_sds: false,
            sds_uds_path: "/run/spire/sockets/agent.sock".to_string(),
        }
    }
}

impl Default for ProxyInitConfig {
    fn default() -> Self {
        Self {
            image: "840364872350.dkr.ecr.us-west-2.amazonaws.com/aws-appmesh-proxy-route-manager:v7-prod"
                .to_string(),
            ignored_ips: "169.254.169.254".to_string(),
            enable_ipv6: true,
        }
    }
}

impl Default for XrayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            image: "public.ecr.aws/xray/aws-xray-daemon".to_string(),
            daemon_port: 2000,
            sampling_rate: None,
            log_level: "info".to_string(),
            role_arn: None,
        }
    }
}

impl Default for JaegerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "appmesh-jaeger.appmesh-system".to_string(),
            port: 9411,
        }
    }
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "datadog.appmesh-system".to_string(),
            port: 8126,
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enable_stats_tags: false,
            enable_statsd: false,
            statsd_port: 8125,
            statsd_address: "127.0.0.1".to_string(),
            statsd_socket_path: None,
        }
    }
}

impl InjectConfig {
    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config_validation(format!("invalid injector config: {}", e)))
    }

    /// Reject inconsistent settings before any pod is processed
    pub fn validate(&self) -> Result<()> {
        if self.tracing.enabled_count() > 1 {
            return Err(Error::config_validation(
                "Envoy only supports a single tracer instance. Please choose between Jaeger, Datadog or X-Ray.",
            ));
        }
        if self.envoy.readiness_probe_period <= 0 {
            return Err(Error::config_validation(format!(
                "envoy.readinessProbePeriod must be positive, got {}",
                self.envoy.readiness_probe_period
            )));
        }
        Ok(())
    }
}

impl TracingConfig {
    /// Number of tracing backends switched on
    pub fn enabled_count(&self) -> usize {
        [self.xray.enabled, self.jaeger.enabled, self.datadog.enabled]
            .into_iter()
            .filter(|enabled| *enabled)
            .count()
    }
}
